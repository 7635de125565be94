use crate::config::AppConfig;
use crate::processing::{legend_label, Choropleth};
use crate::types::{CombinedCounty, Fips};
use anyhow::{Context, Result};
use geo::{LineString, MultiPolygon};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::json;
use std::fs;

pub const TOOLTIP_VISIBLE_OPACITY: f64 = 0.75;
pub const TOOLTIP_HIDDEN_OPACITY: f64 = 0.0;

/// State of the floating hover label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub fips: Option<Fips>,
    pub text: String,
    pub education: Option<f64>,
    pub fill: Option<String>,
    pub opacity: f64,
    pub left: f64,
    pub top: f64,
}

impl Tooltip {
    pub fn hidden() -> Self {
        Self {
            fips: None,
            text: String::new(),
            education: None,
            fill: None,
            opacity: TOOLTIP_HIDDEN_OPACITY,
            left: 0.0,
            top: 0.0,
        }
    }

    /// Pointer entered `county` at page position `pointer`.
    pub fn show(&mut self, map: &Choropleth, county: &CombinedCounty, pointer: (f64, f64)) {
        self.fips = Some(county.id);
        self.text = tooltip_text(county);
        self.education = county.education;
        self.fill = Some(map.fill(county));
        self.opacity = TOOLTIP_VISIBLE_OPACITY;
        self.left = pointer.0;
        self.top = pointer.1;
    }

    /// Pointer left the county. Text and position stay as they were.
    pub fn hide(&mut self) {
        self.opacity = TOOLTIP_HIDDEN_OPACITY;
    }
}

pub fn tooltip_text(county: &CombinedCounty) -> String {
    match (&county.area_name, &county.state, county.education) {
        (Some(area), Some(state), Some(education)) => format!("{}, {} {}%", area, state, education),
        _ => format!("No data for county {}", county.id),
    }
}

/// Writes `index.html`, `map.svg` and `counties.geojson` to the output directory.
pub fn generate_map(config: &AppConfig, map: &Choropleth) -> Result<()> {
    let dir = &config.output.dir;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let svg = render_svg(config, map);
    let page = render_page(config, map, &Tooltip::hidden());
    let geojson = to_geojson(map).to_string();

    for (name, contents) in [("map.svg", &svg), ("index.html", &page), ("counties.geojson", &geojson)] {
        let path = dir.join(name);
        fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))?;
        tracing::info!(path = %path.display(), bytes = contents.len(), "wrote");
    }

    Ok(())
}

pub fn render_svg(config: &AppConfig, map: &Choropleth) -> String {
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\n",
        config.map.width, config.map.height
    );

    for county in &map.counties {
        svg.push_str(&format!(
            r#"<path class="county" d="{}" fill="{}" stroke="none" data-fips="{}""#,
            path_data(&county.geometry),
            escape(&map.fill(county)),
            county.id
        ));
        if let Some(education) = county.education {
            svg.push_str(&format!(r#" data-education="{}""#, education));
        }
        svg.push_str(&format!(" data-tooltip=\"{}\"/>\n", escape(&tooltip_text(county))));
    }

    svg.push_str(&render_legend(config, map));
    svg.push_str("</svg>\n");
    svg
}

fn render_legend(config: &AppConfig, map: &Choropleth) -> String {
    let legend = &config.legend;
    let pitch = legend.swatch + 5.0;

    let mut group = format!(
        "<g id=\"legend\" transform=\"translate({}, {})\">\n",
        legend.x, legend.y
    );
    // Background grows with the number of buckets.
    group.push_str(&format!(
        "<rect x=\"18\" y=\"18\" width=\"140\" height=\"{}\" style=\"fill: white\"/>\n",
        map.legend.len() as f64 * pitch
    ));
    for (i, bucket) in map.legend.iter().enumerate() {
        group.push_str(&format!(
            "<rect x=\"20\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\"/>\n",
            20.0 + i as f64 * pitch,
            legend.swatch,
            legend.swatch,
            bucket.color
        ));
    }
    for (i, bucket) in map.legend.iter().enumerate() {
        group.push_str(&format!(
            "<text x=\"50\" y=\"{}\">{}</text>\n",
            35.0 + i as f64 * pitch,
            legend_label(bucket.threshold)
        ));
    }
    group.push_str("</g>\n");
    group
}

/// SVG path data for a polygon set whose coordinates are already in screen
/// space. Each ring becomes `M..L..Z` without repeating its closing point.
pub fn path_data(geometry: &MultiPolygon<f64>) -> String {
    let mut d = String::new();
    for polygon in geometry {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            d.push_str(&ring_data(ring));
        }
    }
    d
}

fn ring_data(ring: &LineString<f64>) -> String {
    let mut coords = ring.0.as_slice();
    if ring.is_closed() && coords.len() > 1 {
        coords = &coords[..coords.len() - 1];
    }
    if coords.is_empty() {
        return String::new();
    }

    let points: Vec<String> = coords
        .iter()
        .map(|c| format!("{},{}", number(c.x), number(c.y)))
        .collect();
    format!("M{}Z", points.join("L"))
}

fn number(v: f64) -> String {
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "-0" | "" => "0".to_string(),
        _ => s.to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const HOVER_SCRIPT: &str = r##"
function bindHover(svg, tooltip) {
  svg.querySelectorAll("path.county").forEach(function (path) {
    path.addEventListener("mouseenter", function (event) {
      path.setAttribute("stroke", "black");
      path.setAttribute("stroke-width", 1);
      if (path.dataset.education !== undefined) {
        tooltip.setAttribute("data-education", path.dataset.education);
      } else {
        tooltip.removeAttribute("data-education");
      }
      tooltip.textContent = path.dataset.tooltip;
      tooltip.style.opacity = __VISIBLE__;
      tooltip.style.left = event.pageX + "px";
      tooltip.style.top = event.pageY + "px";
    });
    path.addEventListener("mouseleave", function () {
      path.setAttribute("stroke", "none");
      tooltip.style.opacity = __HIDDEN__;
    });
  });
}
bindHover(document.querySelector("#map svg"), document.getElementById("tooltip"));
"##;

/// Full page: heading, the map, the tooltip element in its `tooltip` state,
/// and the script that drives it.
pub fn render_page(config: &AppConfig, map: &Choropleth, tooltip: &Tooltip) -> String {
    let script = HOVER_SCRIPT
        .replace("__VISIBLE__", &TOOLTIP_VISIBLE_OPACITY.to_string())
        .replace("__HIDDEN__", &TOOLTIP_HIDDEN_OPACITY.to_string());

    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    page.push_str(&format!("<title>{}</title>\n", escape(&config.map.title)));
    page.push_str("<style>\nbody { font-family: sans-serif; text-align: center; }\n.map-container { display: inline-block; }\n</style>\n</head>\n<body>\n");
    page.push_str(&format!("<h1 id=\"title\">{}</h1>\n", escape(&config.map.title)));
    page.push_str(&format!("<h3 id=\"description\">{}</h3>\n", escape(&config.map.description)));
    page.push_str(&format!(
        "<div id=\"map\" class=\"map-container\">{}</div>\n",
        render_svg(config, map)
    ));
    page.push_str(&format!(
        r#"<div id="tooltip" style="opacity: {}; left: {}px; top: {}px; position: absolute; pointer-events: none; background-color: black; color: white; border: 2px solid white; border-radius: 10px; padding: 5px; width: 200px">{}</div>"#,
        tooltip.opacity,
        tooltip.left,
        tooltip.top,
        escape(&tooltip.text)
    ));
    page.push('\n');
    page.push_str(r#"<p style="text-align: right; padding: 15px">Source: <a href="https://www.ers.usda.gov/data-products/county-level-data-sets/download-data.aspx">USDA Economic Research Service</a></p>"#);
    page.push_str(&format!("\n<script>{}</script>\n</body>\n</html>\n", script));
    page
}

pub fn to_geojson(map: &Choropleth) -> FeatureCollection {
    let features = map
        .counties
        .iter()
        .map(|county| {
            let mut properties = JsonObject::new();
            properties.insert("fips".to_string(), json!(county.id));
            properties.insert("state".to_string(), json!(county.state));
            properties.insert("area_name".to_string(), json!(county.area_name));
            properties.insert("education".to_string(), json!(county.education));
            properties.insert("fill".to_string(), json!(map.fill(county)));

            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&county.geometry))),
                id: Some(geojson::feature::Id::Number(county.id.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection { bbox: None, features, foreign_members: None }
}
