use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CityListError {
    #[error("failed to read city list from {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// The cities probed on every scheduler tick, each a `"City, Country"` query string.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CityList(Vec<String>);

impl CityList {
    pub fn new(cities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(cities.into_iter().map(Into::into).collect())
    }

    /// Loads one city per line. A missing file is not an error: the scheduler keeps running
    /// with nothing to probe.
    #[tracing::instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, CityListError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let cities = Self::parse(&contents);
                tracing::info!(nr_cities=%cities.len(), ?path, "loaded city list");
                Ok(cities)
            },

            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(?path, "city list file not found -- continuing with no cities");
                Ok(Self::default())
            },

            Err(source) => Err(CityListError::Read { path: path.to_path_buf(), source }),
        }
    }

    pub fn parse(contents: &str) -> Self {
        Self::new(contents.lines().map(str::trim).filter(|line| !line.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
