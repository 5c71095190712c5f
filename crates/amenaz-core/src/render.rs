//! Rendering adapter: turns layer geo data into styled map objects.
//!
//! The output is plain data (path styles, popups, marker icons) so that any
//! map front end can draw it. Styling follows the conventions of the layer
//! tables on the backend, where a feature can override the layer style through
//! the `Espesor`, `Color`, `ColorRelleno` and `Opacidad` properties and point
//! features carry a severity level in `Afectacion`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::geo::{GeoData, Geometry};
use crate::models::{City, LatLng, Layer};

/// Stroke weight for layer outlines before feature overrides
pub const BASE_WEIGHT: f64 = 0.30;

/// Stroke opacity for layer outlines
pub const BASE_OPACITY: f64 = 1.0;

const PROP_WEIGHT: &str = "Espesor";
const PROP_COLOR: &str = "Color";
const PROP_FILL_COLOR: &str = "ColorRelleno";
const PROP_FILL_OPACITY: &str = "Opacidad";
const PROP_SEVERITY: &str = "Afectacion";

/// Properties that only drive styling and are left out of popups
const STYLE_PROPERTIES: [&str; 4] = [PROP_WEIGHT, PROP_COLOR, PROP_FILL_COLOR, PROP_FILL_OPACITY];

/// Popup text for properties the backend stored as the string "null"
const NO_DATA: &str = "Sin datos";

const SHADOW_URL: &str = "assets/marker-shadow.png";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill: bool,
    pub fill_color: Option<String>,
    pub fill_opacity: Option<f64>,
}

impl PathStyle {
    pub fn base(color: &str) -> Self {
        Self {
            color: color.to_string(),
            weight: BASE_WEIGHT,
            opacity: BASE_OPACITY,
            fill: false,
            fill_color: None,
            fill_opacity: None,
        }
    }

    /// Apply per-feature overrides in fixed order: weight, stroke color,
    /// fill color, fill opacity. Only truthy values take effect.
    pub fn with_overrides(mut self, properties: &Map<String, Value>) -> Self {
        if let Some(weight) = properties.get(PROP_WEIGHT).and_then(truthy_number) {
            self.weight = weight;
        }
        if let Some(color) = properties.get(PROP_COLOR).and_then(truthy_string) {
            self.color = color;
        }
        if let Some(fill_color) = properties.get(PROP_FILL_COLOR).and_then(truthy_string) {
            self.fill_color = Some(fill_color);
            self.fill = true;
        }
        if let Some(opacity) = properties.get(PROP_FILL_OPACITY).and_then(truthy_number) {
            self.fill_opacity = Some(opacity);
        }
        self
    }
}

/// Severity level 1 (lowest) to 5 (highest) for point features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityLevel(u8);

impl SeverityLevel {
    pub fn new(level: u8) -> Option<Self> {
        (1..=5).contains(&level).then_some(Self(level))
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// Read the level from a feature attribute. Accepts exactly "1".."5"
    /// or the integers 1..5.
    pub fn from_property(value: &Value) -> Option<Self> {
        let level = match value {
            Value::String(s) => match s.as_str() {
                "1" => 1,
                "2" => 2,
                "3" => 3,
                "4" => 4,
                "5" => 5,
                _ => return None,
            },
            Value::Number(n) => u8::try_from(n.as_u64()?).ok()?,
            _ => return None,
        };
        Self::new(level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerIcon {
    /// Standard map pin, used for city markers
    Default,
    Severity(SeverityLevel),
    /// Small pin for points without a recognized severity
    Generic,
    /// Pin for a place picked from search results
    Search,
}

/// Icon geometry in pixels, as consumed by the map front end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconOptions {
    pub icon_url: String,
    pub icon_retina_url: String,
    pub shadow_url: String,
    pub icon_size: (u32, u32),
    pub icon_anchor: (i32, i32),
    pub popup_anchor: (i32, i32),
    pub tooltip_anchor: Option<(i32, i32)>,
    pub shadow_size: (u32, u32),
}

impl MarkerIcon {
    pub fn for_properties(properties: &Map<String, Value>) -> Self {
        properties
            .get(PROP_SEVERITY)
            .and_then(SeverityLevel::from_property)
            .map(MarkerIcon::Severity)
            .unwrap_or(MarkerIcon::Generic)
    }

    pub fn options(&self) -> IconOptions {
        match self {
            MarkerIcon::Default => IconOptions {
                icon_url: "assets/marker-icon.png".to_string(),
                icon_retina_url: "assets/marker-icon-2x.png".to_string(),
                shadow_url: SHADOW_URL.to_string(),
                icon_size: (25, 41),
                icon_anchor: (12, 41),
                popup_anchor: (1, -34),
                tooltip_anchor: None,
                shadow_size: (41, 41),
            },
            MarkerIcon::Search => IconOptions {
                icon_url: "assets/icon/marker-icon-2.png".to_string(),
                icon_retina_url: "assets/icon/marker-icon-2-2x.png".to_string(),
                shadow_url: SHADOW_URL.to_string(),
                icon_size: (25, 41),
                icon_anchor: (12, 41),
                popup_anchor: (1, -34),
                tooltip_anchor: Some((16, -28)),
                shadow_size: (41, 41),
            },
            MarkerIcon::Severity(level) => {
                let url = format!("assets/icon/level-{}.png", level.level());
                Self::small_icon(url)
            }
            MarkerIcon::Generic => Self::small_icon("assets/icon/marker-icon-4.png".to_string()),
        }
    }

    fn small_icon(url: String) -> IconOptions {
        IconOptions {
            icon_retina_url: url.clone(),
            icon_url: url,
            shadow_url: SHADOW_URL.to_string(),
            icon_size: (12, 13),
            icon_anchor: (12, 13),
            popup_anchor: (1, -34),
            tooltip_anchor: None,
            shadow_size: (20, 20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub location: LatLng,
    pub icon: MarkerIcon,
    pub popup: Option<String>,
}

impl Marker {
    pub fn for_city(city: &City) -> Self {
        Self {
            location: city.location,
            icon: MarkerIcon::Default,
            popup: Some(city.name.clone()),
        }
    }

    pub fn search(location: LatLng) -> Self {
        Self {
            location,
            icon: MarkerIcon::Search,
            popup: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedFeature {
    pub geometry_type: &'static str,
    pub style: PathStyle,
    pub popup: Option<String>,
    /// Set for point geometries only
    pub icon: Option<MarkerIcon>,
    /// GeoJSON geometry, unchanged from the source feature
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedLayer {
    pub layer_id: i64,
    pub layer_name: String,
    pub base_style: PathStyle,
    pub features: Vec<RenderedFeature>,
}

/// Render a downloaded layer. Returns `None` while the layer has no geo data.
pub fn render_layer(layer: &Layer) -> Option<RenderedLayer> {
    let data = layer.geo_data()?;
    Some(RenderedLayer {
        layer_id: layer.id,
        layer_name: layer.layer_name.clone(),
        base_style: PathStyle::base(&layer.color),
        features: render_features(&layer.color, data),
    })
}

pub fn render_features(color: &str, data: &GeoData) -> Vec<RenderedFeature> {
    data.features
        .iter()
        .map(|feature| {
            let icon = feature
                .geometry
                .as_ref()
                .filter(|g| g.is_point_like())
                .map(|_| MarkerIcon::for_properties(&feature.properties));
            RenderedFeature {
                geometry_type: feature.geometry.as_ref().map(Geometry::type_name).unwrap_or("None"),
                style: PathStyle::base(color).with_overrides(&feature.properties),
                popup: popup_html(&feature.properties),
                icon,
                geometry: feature.geometry.clone(),
            }
        })
        .collect()
}

/// Build the popup body listing every non-style property, in the order the
/// backend sent them.
pub fn popup_html(properties: &Map<String, Value>) -> Option<String> {
    if properties.is_empty() {
        return None;
    }
    let mut message = String::new();
    for (key, value) in properties {
        if STYLE_PROPERTIES.contains(&key.as_str()) {
            continue;
        }
        message.push_str(&format!(
            "<b>{}:</b>  {}<br />",
            escape_html(key),
            escape_html(&display_value(value))
        ));
    }
    Some(message)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => NO_DATA.to_string(),
        Value::String(s) if s == "null" => NO_DATA.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn truthy_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn truthy_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n != 0.0 && !n.is_nan()).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn point_layer(properties: Value) -> Layer {
        let mut layer = Layer::new(4, "Deslizamientos", "deslizamientos", "#ff8800");
        let data = GeoData::from_value(&json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-66.85, 10.49]},
                "properties": properties
            }]
        }))
        .expect("valid geojson");
        layer.attach_geo_data(data).expect("attach");
        layer
    }

    #[test]
    fn test_severity_three_gets_level_three_icon() {
        let layer = point_layer(json!({"Afectacion": "3"}));
        let rendered = render_layer(&layer).expect("downloaded layer renders");
        let icon = rendered.features[0].icon.expect("points carry an icon");

        assert_eq!(icon, MarkerIcon::Severity(SeverityLevel(3)));
        assert_eq!(icon.options().icon_url, "assets/icon/level-3.png");
        assert_eq!(icon.options().icon_size, (12, 13));
    }

    #[test]
    fn test_missing_or_unknown_severity_gets_generic_icon() {
        for properties in [json!({}), json!({"Afectacion": "7"}), json!({"Afectacion": "alta"}), json!({"Afectacion": null})] {
            let layer = point_layer(properties);
            let rendered = render_layer(&layer).expect("renders");
            assert_eq!(rendered.features[0].icon, Some(MarkerIcon::Generic));
        }
        assert_eq!(MarkerIcon::Generic.options().icon_url, "assets/icon/marker-icon-4.png");
    }

    #[test]
    fn test_numeric_severity_accepted() {
        assert_eq!(SeverityLevel::from_property(&json!(5)), SeverityLevel::new(5));
        assert_eq!(SeverityLevel::from_property(&json!(0)), None);
        assert_eq!(SeverityLevel::from_property(&json!(2.5)), None);
    }

    #[test]
    fn test_severity_string_must_match_exactly() {
        assert_eq!(SeverityLevel::from_property(&json!("3")), SeverityLevel::new(3));
        for loose in ["+3", "03", " 3", "3 ", "3.0", "0", "6"] {
            assert_eq!(SeverityLevel::from_property(&json!(loose)), None, "{:?}", loose);
        }
    }

    #[test]
    fn test_style_overrides() {
        let style = PathStyle::base("#ff0000").with_overrides(&props(json!({
            "Espesor": "2.5",
            "Color": "#00ff00",
            "ColorRelleno": "#0000ff",
            "Opacidad": 0.4
        })));
        assert_eq!(style.weight, 2.5);
        assert_eq!(style.color, "#00ff00");
        assert!(style.fill);
        assert_eq!(style.fill_color.as_deref(), Some("#0000ff"));
        assert_eq!(style.fill_opacity, Some(0.4));
        assert_eq!(style.opacity, BASE_OPACITY);
    }

    #[test]
    fn test_falsy_overrides_are_ignored() {
        let style = PathStyle::base("#ff0000").with_overrides(&props(json!({
            "Espesor": 0,
            "Color": "",
            "ColorRelleno": null,
            "Opacidad": "abc"
        })));
        assert_eq!(style, PathStyle::base("#ff0000"));
        assert!(!style.fill);
        assert_eq!(style.weight, BASE_WEIGHT);
    }

    #[test]
    fn test_popup_skips_style_keys_and_marks_missing_data() {
        let popup = popup_html(&props(json!({
            "Nombre": "Quebrada Chacaito",
            "Caudal": "null",
            "Longitud": 1200,
            "Color": "#0000ff",
            "Espesor": 3
        })))
        .expect("popup");

        assert!(popup.contains("<b>Nombre:</b>  Quebrada Chacaito<br />"));
        assert!(popup.contains("<b>Caudal:</b>  Sin datos<br />"));
        assert!(popup.contains("<b>Longitud:</b>  1200<br />"));
        assert!(!popup.contains("Color"));
        assert!(!popup.contains("Espesor"));
    }

    #[test]
    fn test_popup_keeps_backend_property_order() {
        let data = GeoData::from_value(&json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [0, 0]},
            "properties": {"Zona": "Norte", "Afectacion": "2", "Barrio": "Bello Campo"}
        }))
        .expect("valid");
        let popup = popup_html(&data.features[0].properties).expect("popup");

        let zona = popup.find("Zona").expect("zona");
        let afectacion = popup.find("Afectacion").expect("afectacion");
        let barrio = popup.find("Barrio").expect("barrio");
        assert!(zona < afectacion && afectacion < barrio, "{}", popup);
    }

    #[test]
    fn test_popup_escapes_markup() {
        let popup = popup_html(&props(json!({
            "<script>": "a & b <i>c</i>"
        })))
        .expect("popup");
        assert_eq!(
            popup,
            "<b>&lt;script&gt;:</b>  a &amp; b &lt;i&gt;c&lt;/i&gt;<br />"
        );
    }

    #[test]
    fn test_paths_have_no_icon() {
        let mut layer = Layer::new(2, "Vialidad", "vialidad", "#999999");
        layer
            .attach_geo_data(
                GeoData::from_value(&json!({"type": "LineString", "coordinates": [[0, 0], [1, 1]]}))
                    .expect("valid"),
            )
            .expect("attach");

        let rendered = render_layer(&layer).expect("renders");
        assert_eq!(rendered.base_style, PathStyle::base("#999999"));
        assert_eq!(rendered.features[0].geometry_type, "LineString");
        assert_eq!(rendered.features[0].icon, None);
        assert_eq!(rendered.features[0].popup, None);
    }

    #[test]
    fn test_pending_layer_does_not_render() {
        let layer = Layer::new(2, "Vialidad", "vialidad", "#999999");
        assert!(render_layer(&layer).is_none());
    }

    #[test]
    fn test_city_marker() {
        let city = City::new(3, "Chacao", "chacao", LatLng::new(10.49, -66.85), 13);
        let marker = Marker::for_city(&city);
        assert_eq!(marker.popup.as_deref(), Some("Chacao"));
        assert_eq!(marker.icon, MarkerIcon::Default);
        assert_eq!(marker.icon.options().icon_size, (25, 41));
    }

    #[test]
    fn test_search_marker_icon() {
        let marker = Marker::search(LatLng::new(10.5, -66.9));
        assert_eq!(marker.icon, MarkerIcon::Search);
        assert_eq!(marker.popup, None);

        let options = marker.icon.options();
        assert_eq!(options.icon_url, "assets/icon/marker-icon-2.png");
        assert_eq!(options.icon_retina_url, "assets/icon/marker-icon-2-2x.png");
        assert_eq!(options.icon_size, (25, 41));
        assert_eq!(options.icon_anchor, (12, 41));
        assert_eq!(options.tooltip_anchor, Some((16, -28)));
    }
}
