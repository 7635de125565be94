use crate::config::AppConfig;
use crate::processing::Choropleth;
use crate::render::Tooltip;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

// Wrapper for RTree indexing
struct CountyIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for CountyIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub map: Choropleth,
    tree: RTree<CountyIndex>,
}

impl AppState {
    pub fn new(map: Choropleth) -> Self {
        let items: Vec<CountyIndex> = map
            .counties
            .iter()
            .enumerate()
            .filter_map(|(index, county)| {
                let rect = county.geometry.bounding_rect()?;
                Some(CountyIndex {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        let tree = RTree::bulk_load(items);
        tracing::debug!(indexed = tree.size(), "county spatial index built");
        Self { map, tree }
    }

    /// The tooltip a pointer at map position (`x`, `y`) would show, if it
    /// is over a county.
    pub fn hover(&self, x: f64, y: f64) -> Option<Tooltip> {
        let point = Point::new(x, y);
        let envelope = AABB::from_point([x, y]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.map.counties.get(candidate.index))
            .find(|county| county.geometry.contains(&point))
            .map(|county| {
                let mut tooltip = Tooltip::hidden();
                tooltip.show(&self.map, county, (x, y));
                tooltip
            })
    }
}

#[derive(Deserialize)]
pub struct HoverParams {
    x: f64,
    y: f64,
}

pub fn router(config: &AppConfig, state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/county", get(county_handler))
        .fallback_service(ServeDir::new(&config.output.dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, map: Choropleth) -> Result<()> {
    let state = Arc::new(AppState::new(map));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("serving map on http://{}", addr);

    axum::serve(listener, router(&config, state)).await?;
    Ok(())
}

async fn county_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HoverParams>,
) -> Json<Option<Tooltip>> {
    Json(state.hover(params.x, params.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Datasets;
    use crate::processing::process_data;
    use crate::types::{County, EducationRecord};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use geo::{polygon, MultiPolygon};
    use tower::ServiceExt;

    fn sample_state() -> Arc<AppState> {
        let counties = vec![
            County {
                id: 1001,
                geometry: MultiPolygon::new(vec![polygon![
                    (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0),
                ]]),
            },
            County {
                id: 1003,
                geometry: MultiPolygon::new(vec![polygon![
                    (x: 10.0, y: 0.0), (x: 20.0, y: 0.0), (x: 10.0, y: 10.0),
                ]]),
            },
        ];
        let education = vec![EducationRecord {
            fips: 1001,
            state: "AL".to_string(),
            area_name: "Autauga County".to_string(),
            bachelors_or_higher: 21.9,
        }];
        let map = process_data(&AppConfig::default(), Datasets { counties, education });
        Arc::new(AppState::new(map))
    }

    #[test]
    fn hover_finds_the_containing_county() {
        let state = sample_state();

        let tooltip = state.hover(5.0, 5.0).unwrap();
        assert_eq!(tooltip.fips, Some(1001));
        assert_eq!(tooltip.text, "Autauga County, AL 21.9%");
        assert_eq!(tooltip.opacity, 0.75);

        // Inside the triangle's bounding box but outside the triangle.
        assert!(state.hover(18.0, 9.0).is_none());

        let unmatched = state.hover(12.0, 2.0).unwrap();
        assert_eq!(unmatched.fips, Some(1003));
        assert_eq!(unmatched.fill.as_deref(), Some("white"));

        assert!(state.hover(500.0, 500.0).is_none());
    }

    #[tokio::test]
    async fn county_endpoint_returns_tooltip_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.output.dir = dir.path().to_path_buf();
        let app = router(&config, sample_state());

        let response = app
            .oneshot(Request::builder().uri("/api/county?x=5&y=5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["fips"], 1001);
        assert_eq!(json["text"], "Autauga County, AL 21.9%");
        assert_eq!(json["opacity"], 0.75);
    }

    #[tokio::test]
    async fn county_endpoint_returns_null_off_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.output.dir = dir.path().to_path_buf();
        let app = router(&config, sample_state());

        let response = app
            .oneshot(Request::builder().uri("/api/county?x=-5&y=-5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"null");
    }

    #[tokio::test]
    async fn output_directory_is_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>map</h1>").unwrap();
        let mut config = AppConfig::default();
        config.output.dir = dir.path().to_path_buf();
        let app = router(&config, sample_state());

        let response = app
            .oneshot(Request::builder().uri("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<h1>map</h1>");
    }
}
