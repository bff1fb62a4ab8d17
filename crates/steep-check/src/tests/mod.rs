//! Unit tests for signature loading and validation.


use std::path::PathBuf;

use crate::CheckService;

pub(crate) fn service(sources: &[(&str, &str)]) -> CheckService {
    CheckService::from_sources(
        sources
            .iter()
            .map(|(path, source)| (PathBuf::from(path), source.to_string()))
            .collect(),
    )
}
