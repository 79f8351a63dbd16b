use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown {kind} `{value}`")]
    UnknownValue { kind: &'static str, value: String },
}

impl DomainError {
    pub fn unknown_value(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownValue {
            kind,
            value: value.into(),
        }
    }
}
