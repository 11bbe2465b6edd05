//! CLI command definitions and request input.
//!
//! Uses clap derive macros for argument definitions.

pub mod args;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use patchpilot::models::ReviewRequest;

/// Read and validate a review request from a file, or stdin when `path` is `None`.
pub fn read_request(path: Option<&Path>) -> Result<ReviewRequest> {
    let json = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    ReviewRequest::from_json(&json).context("invalid review request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_request_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"source":"octo","project":"widgets","request_number":4,"changes":[{{"path":"a.rs","patch":"+a","status":"added"}}]}}"#
        )
        .unwrap();

        let request = read_request(Some(file.path())).unwrap();
        assert_eq!(request.key().to_string(), "octo/widgets#4");
        assert_eq!(request.changes().len(), 1);
    }

    #[test]
    fn invalid_request_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"source":"","project":"widgets","request_number":4}}"#).unwrap();

        let err = read_request(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("invalid review request"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_request(Some(Path::new("/nonexistent/request.json"))).unwrap_err();
        assert!(err.to_string().contains("failed to read request file"));
    }
}
