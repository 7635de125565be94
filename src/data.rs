use crate::config::{AppConfig, Source};
use crate::topology::Topology;
use crate::types::{County, EducationRecord};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Instant;

/// Both datasets, decoded and ready to join.
#[derive(Debug)]
pub struct Datasets {
    pub counties: Vec<County>,
    pub education: Vec<EducationRecord>,
}

pub async fn load_data(config: &AppConfig) -> Result<Datasets> {
    let client = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    // Neither load depends on the other.
    let (topology, education) = tokio::try_join!(
        load_json::<Topology>(&client, &config.input.counties),
        load_json::<Vec<EducationRecord>>(&client, &config.input.education),
    )?;

    let object = &config.input.topology_object;
    let counties = topology
        .counties(object)
        .with_context(|| format!("Failed to decode topology object '{}'", object))?;

    tracing::info!(
        counties = counties.len(),
        records = education.len(),
        "datasets loaded"
    );

    Ok(Datasets { counties, education })
}

async fn load_json<T: DeserializeOwned>(client: &Client, source: &Source) -> Result<T> {
    tracing::info!(source = %source, "fetching");
    let started = Instant::now();
    let bytes = read_source(client, source).await?;
    tracing::info!(
        source = %source,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fetched"
    );

    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse JSON from {}", source))
}

async fn read_source(client: &Client, source: &Source) -> Result<Vec<u8>> {
    match source {
        Source::Url(url) => {
            let response = client
                .get(url)
                .send()
                .await
                .with_context(|| format!("Request to {} failed", url))?
                .error_for_status()
                .with_context(|| format!("Bad response from {}", url))?;
            let body = response
                .bytes()
                .await
                .with_context(|| format!("Failed to read body from {}", url))?;
            Ok(body.to_vec())
        }
        Source::File(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    const TOPOLOGY: &str = r#"{
        "type": "Topology",
        "arcs": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]],
        "objects": { "counties": { "type": "GeometryCollection", "geometries": [
            { "type": "Polygon", "arcs": [[0]], "id": 1001 }
        ] } }
    }"#;

    const EDUCATION: &str = r#"[
        { "fips": 1001, "state": "AL", "area_name": "Autauga County", "bachelorsOrHigher": 21.9 },
        { "fips": 1003, "state": "AL", "area_name": "Baldwin County", "bachelorsOrHigher": 28.6 }
    ]"#;

    fn config_for(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.input.counties = Source::File(dir.join("counties.json"));
        config.input.education = Source::File(dir.join("education.json"));
        config
    }

    #[tokio::test]
    async fn loads_both_datasets_from_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("counties.json"), TOPOLOGY).unwrap();
        std::fs::write(dir.path().join("education.json"), EDUCATION).unwrap();

        let data = load_data(&config_for(dir.path())).await.unwrap();

        assert_eq!(data.counties.len(), 1);
        assert_eq!(data.counties[0].id, 1001);
        assert_eq!(data.education.len(), 2);
        assert_eq!(data.education[1].area_name, "Baldwin County");
        assert_eq!(data.education[1].bachelors_or_higher, 28.6);
    }

    #[tokio::test]
    async fn missing_file_names_the_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("counties.json"), TOPOLOGY).unwrap();

        let err = load_data(&config_for(dir.path())).await.unwrap_err();
        assert!(format!("{:#}", err).contains("education.json"));
    }

    #[tokio::test]
    async fn wrong_topology_object_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("counties.json"), TOPOLOGY).unwrap();
        std::fs::write(dir.path().join("education.json"), EDUCATION).unwrap();

        let mut config = config_for(dir.path());
        config.input.topology_object = "states".to_string();
        let err = load_data(&config).await.unwrap_err();
        assert!(format!("{:#}", err).contains("states"));
    }

    #[tokio::test]
    async fn malformed_education_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("counties.json"), TOPOLOGY).unwrap();
        std::fs::write(dir.path().join("education.json"), r#"[{ "fips": "x" }]"#).unwrap();

        assert!(load_data(&config_for(dir.path())).await.is_err());
    }

    #[tokio::test]
    async fn logs_fetch_start_before_completion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("counties.json"), TOPOLOGY).unwrap();
        std::fs::write(dir.path().join("education.json"), EDUCATION).unwrap();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        load_data(&config_for(dir.path())).await.unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let started = output.find("fetching").expect("no fetch start event");
        let finished = output.find("fetched").expect("no fetch completion event");
        assert!(started < finished);
        assert!(output.contains("education.json"));
    }
}
