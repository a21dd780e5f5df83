//! Stable request fingerprinting, used as a cache key (SPEC_FULL.md §3).

use sha2::{Digest, Sha256};

/// A field-separator byte that cannot appear in ordinary query text.
const FIELD_SEP: u8 = 0x1F;
/// Sentinel marking an absent (`None`) field, distinct from an empty string.
const NONE_SENTINEL: u8 = 0x00;
/// Separator used between list elements within one field.
const LIST_SEP: u8 = 0x1E;

/// Builds a deterministic byte encoding of an ordered set of fields, then
/// hashes it with SHA-256. Two builders fed the same fields in the same
/// order always produce the same fingerprint; fields must be fed in a
/// fixed, documented order by the caller.
#[derive(Default)]
pub struct FingerprintBuilder {
    buf: Vec<u8>,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push_sep(&mut self) {
        if !self.buf.is_empty() {
            self.buf.push(FIELD_SEP);
        }
    }

    pub fn field_str(mut self, value: &str) -> Self {
        self.push_sep();
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn field_opt_str(mut self, value: Option<&str>) -> Self {
        self.push_sep();
        match value {
            Some(v) => self.buf.extend_from_slice(v.as_bytes()),
            None => self.buf.push(NONE_SENTINEL),
        }
        self
    }

    pub fn field_i64(mut self, value: i64) -> Self {
        self.push_sep();
        self.buf.extend_from_slice(value.to_string().as_bytes());
        self
    }

    pub fn field_opt_f32(mut self, value: Option<f32>) -> Self {
        self.push_sep();
        match value {
            Some(v) => self
                .buf
                .extend_from_slice(format!("{:.6}", v).as_bytes()),
            None => self.buf.push(NONE_SENTINEL),
        }
        self
    }

    pub fn field_opt_i64(mut self, value: Option<i64>) -> Self {
        self.push_sep();
        match value {
            Some(v) => self.buf.extend_from_slice(v.to_string().as_bytes()),
            None => self.buf.push(NONE_SENTINEL),
        }
        self
    }

    pub fn field_bool(mut self, value: bool) -> Self {
        self.push_sep();
        self.buf.push(if value { 1 } else { 0 });
        self
    }

    pub fn field_list(mut self, values: &[String]) -> Self {
        self.push_sep();
        if values.is_empty() {
            self.buf.push(NONE_SENTINEL);
        } else {
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    self.buf.push(LIST_SEP);
                }
                self.buf.extend_from_slice(v.as_bytes());
            }
        }
        self
    }

    /// Finalize: hex-encoded SHA-256 digest of the accumulated bytes.
    pub fn finish(self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.buf);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_produce_same_fingerprint() {
        let a = FingerprintBuilder::new()
            .field_str("query")
            .field_opt_str(Some("conv-1"))
            .field_i64(500)
            .finish();
        let b = FingerprintBuilder::new()
            .field_str("query")
            .field_opt_str(Some("conv-1"))
            .field_i64(500)
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn none_and_empty_string_are_distinguished() {
        let with_none = FingerprintBuilder::new().field_opt_str(None).finish();
        let with_empty = FingerprintBuilder::new().field_opt_str(Some("")).finish();
        assert_ne!(with_none, with_empty);
    }

    #[test]
    fn field_order_matters() {
        let a = FingerprintBuilder::new()
            .field_str("x")
            .field_str("y")
            .finish();
        let b = FingerprintBuilder::new()
            .field_str("y")
            .field_str("x")
            .finish();
        assert_ne!(a, b);
    }

    #[test]
    fn list_fields_distinguish_boundaries() {
        let a = FingerprintBuilder::new()
            .field_list(&["ab".to_string(), "c".to_string()])
            .finish();
        let b = FingerprintBuilder::new()
            .field_list(&["a".to_string(), "bc".to_string()])
            .finish();
        assert_ne!(a, b);
    }
}
