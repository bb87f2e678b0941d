use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::error::StorageError;

/// On-disk segment used for an empty key component. Client-supplied
/// components may not start with a dot, so this can never collide.
pub const UNNAMED_SEGMENT: &str = ".unnamed";

/// A decoded log record as sent by a forwarder
///
/// Missing fields decode as empty strings; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Tenant identifier
    pub token: String,

    /// Category of the source
    #[serde(rename = "type")]
    pub kind: String,

    /// Sub-source identifier
    pub name: String,

    /// Free-text payload
    pub data: String,

    /// Arrival order within the connection, assigned by the decoder
    #[serde(skip)]
    pub sequence: u64,
}

impl Record {
    pub fn new(
        token: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            kind: kind.into(),
            name: name.into(),
            data: data.into(),
            sequence: 0,
        }
    }

    /// Key of the sink this record is routed to
    pub fn sink_key(&self) -> SinkKey {
        SinkKey::new(&self.token, &self.kind, &self.name)
    }

    /// Payload without its trailing line terminator
    pub fn line(&self) -> &str {
        self.data.trim_end_matches(['\r', '\n'])
    }
}

/// Identity of a sink: `(token, type, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkKey {
    pub token: String,
    pub kind: String,
    pub name: String,
}

impl SinkKey {
    pub fn new(token: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Directory holding this sink, relative to the logs root
    pub fn relative_dir(&self) -> Result<PathBuf, StorageError> {
        let mut dir = PathBuf::from(path_segment("token", &self.token)?);
        dir.push(path_segment("type", &self.kind)?);
        Ok(dir)
    }

    /// File name of the active log file
    pub fn file_name(&self) -> Result<&str, StorageError> {
        path_segment("name", &self.name)
    }
}

impl std::fmt::Display for SinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.token, self.kind, self.name)
    }
}

/// Map a key component onto a single file system segment
///
/// Empty components map to [`UNNAMED_SEGMENT`]. Anything that could escape
/// the parent directory or name a hidden file is rejected.
pub fn path_segment<'a>(field: &'static str, value: &'a str) -> Result<&'a str, StorageError> {
    let invalid = |reason| StorageError::InvalidKey {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Ok(UNNAMED_SEGMENT);
    }
    if value.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(invalid("must not contain path separators"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let record: Record = serde_json::from_str(
            r#"{"token":"t1","type":"app","name":"web","data":"hi","host":"a"}"#,
        )
        .unwrap();
        assert_eq!(record, Record::new("t1", "app", "web", "hi"));
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let record: Record = serde_json::from_str(r#"{"token":"t1"}"#).unwrap();
        assert_eq!(record.kind, "");
        assert_eq!(record.name, "");
        assert_eq!(record.data, "");
    }

    #[test]
    fn test_non_string_field_is_rejected() {
        assert!(serde_json::from_str::<Record>(r#"{"token":5}"#).is_err());
        assert!(serde_json::from_str::<Record>(r#"["t1"]"#).is_err());
    }

    #[test]
    fn test_line_trims_terminators() {
        assert_eq!(Record::new("t", "a", "n", "hello\n").line(), "hello");
        assert_eq!(Record::new("t", "a", "n", "hello\r\n").line(), "hello");
        assert_eq!(Record::new("t", "a", "n", "  keep  ").line(), "  keep  ");
    }

    #[test]
    fn test_sink_key_paths() {
        let key = SinkKey::new("t1", "app", "web");
        assert_eq!(key.relative_dir().unwrap(), PathBuf::from("t1").join("app"));
        assert_eq!(key.file_name().unwrap(), "web");
        assert_eq!(key.to_string(), "t1/app/web");

        let unnamed = SinkKey::new("t1", "app", "");
        assert_eq!(unnamed.file_name().unwrap(), UNNAMED_SEGMENT);
    }

    #[test]
    fn test_path_segment_rejects_escapes() {
        assert!(path_segment("token", "..").is_err());
        assert!(path_segment("token", ".").is_err());
        assert!(path_segment("token", ".hidden").is_err());
        assert!(path_segment("type", "a/b").is_err());
        assert!(path_segment("type", "a\\b").is_err());
        assert!(path_segment("name", "app.log").is_ok());
    }
}
