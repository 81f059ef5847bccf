use crate::identifiers::{get_bytes, get_str, get_u16, put_bytes, put_str, FormatError, WireFormat};
use bytes::{Buf, BufMut, Bytes};
use std::fmt;

/// Location of a node in the data tree. The empty path is the root.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataPath {
    segments: Vec<String>,
}

impl DataPath {
    pub fn root() -> Self {
        DataPath::default()
    }

    /// Segments must be non-empty and at most 65535 bytes.
    pub fn new<I, S>(segments: I) -> Result<Self, &'static str>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err("Path segment must not be empty");
            }
            if segment.len() > u16::MAX as usize {
                return Err("Path segment longer than 65535 bytes");
            }
        }
        if segments.len() > u16::MAX as usize {
            return Err("Path deeper than 65535 segments");
        }

        Ok(DataPath { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &DataPath) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl WireFormat for DataPath {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.segments.len() as u16);
        for segment in &self.segments {
            put_str(buf, segment);
        }
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        let len = get_u16(buf, "path length")?;
        let mut segments = Vec::with_capacity(len as usize);
        for _ in 0..len {
            segments.push(get_str(buf, "path segment")?);
        }

        DataPath::new(segments).map_err(|reason| FormatError::Invalid {
            field: "path",
            reason: reason.to_string(),
        })
    }
}

impl fmt::Debug for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// Opaque node content. The access layer never looks inside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedNode(Bytes);

impl NormalizedNode {
    pub fn new(data: impl Into<Bytes>) -> Self {
        NormalizedNode(data.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl WireFormat for NormalizedNode {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        put_bytes(buf, &self.0);
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        Ok(NormalizedNode(get_bytes(buf, "node data")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path() {
        assert!(DataPath::root().is_root());
        assert_eq!(format!("{:?}", DataPath::root()), "/");
        assert_eq!(format!("{:?}", DataPath::new(vec!["a", "b"]).unwrap()), "/a/b");
    }

    #[test]
    fn empty_segment_rejected() {
        assert!(DataPath::new(vec!["a", ""]).is_err());
    }

    #[test]
    fn prefix() {
        let parent = DataPath::new(vec!["cars"]).unwrap();
        let child = DataPath::new(vec!["cars", "car-1"]).unwrap();

        assert!(child.starts_with(&parent));
        assert!(child.starts_with(&DataPath::root()));
        assert!(!parent.starts_with(&child));
    }
}
