//! Built-in city list used when the registry is not backed by `getlocations`.

use crate::models::{City, LatLng, Layer};

/// Id of the country-wide overview entry
pub const OVERVIEW_CITY_ID: i64 = 0;

const OVERVIEW_ZOOM_LEVEL: u8 = 5;

/// Country-wide entry shown before any city is picked
pub fn overview_city() -> City {
    City::new(
        OVERVIEW_CITY_ID,
        "Visión del Proyecto",
        "",
        LatLng::new(8.031, -65.346),
        OVERVIEW_ZOOM_LEVEL,
    )
}

fn chacao() -> City {
    let layers = vec![
        Layer::new(1, "Límite municipal", "limite_municipal", "#ffffff")
            .with_description("Límite político-administrativo del municipio"),
        Layer::new(2, "Vialidad", "vialidad", "#9e9e9e").with_description("Red vial principal"),
        Layer::new(3, "Quebradas", "quebradas", "#2196f3")
            .with_description("Cauces y quebradas")
            .with_threats(&["Inundación"]),
        Layer::new(4, "Zonas inundables", "zonas_inundables", "#0d47a1")
            .with_description("Áreas susceptibles a inundación")
            .with_threats(&["Inundación"]),
        Layer::new(5, "Fallas geológicas", "fallas_geologicas", "#e53935")
            .with_description("Trazas de fallas activas")
            .with_threats(&["Sismo"]),
        Layer::new(6, "Microzonas sísmicas", "microzonas_sismicas", "#ff7043")
            .with_description("Microzonificación sísmica")
            .with_threats(&["Sismo"]),
        Layer::new(7, "Deslizamientos", "deslizamientos", "#8d6e63")
            .with_description("Movimientos de masa registrados")
            .with_threats(&["Deslizamiento"]),
        Layer::new(8, "Centros de salud", "centros_salud", "#43a047")
            .with_description("Hospitales y ambulatorios"),
        Layer::new(9, "Refugios", "refugios", "#fdd835")
            .with_description("Refugios y puntos de encuentro")
            .with_threats(&["Inundación", "Sismo", "Deslizamiento"]),
    ];

    City::new(1, "Chacao", "chacao", LatLng::new(10.4961, -66.8533), 13).with_layers(layers)
}

/// The static registry: the overview entry plus cities with known layers
pub fn static_cities() -> Vec<City> {
    vec![overview_city(), chacao()]
}
