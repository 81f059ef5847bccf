use crate::identifiers::codec::{get_str, put_str, FormatError, WireFormat};
use bytes::{Buf, BufMut};
use std::fmt;
use std::sync::Arc;

const MAX_NAME_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Name must not be empty")]
    Empty,
    #[error("Name is {0} bytes long, limit is 65535")]
    TooLong(usize),
    #[error("Frontend type contains illegal character {0:?}")]
    IllegalCharacter(char),
}

fn check_len(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong(name.len()));
    }

    Ok(())
}

/// Name of a cluster member. Cheap to clone, the string is shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberName(Arc<str>);

impl MemberName {
    pub fn new(name: impl AsRef<str>) -> Result<Self, NameError> {
        let name = name.as_ref();
        check_len(name)?;
        Ok(MemberName(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Logical role of a frontend on a member, e.g. `datastore-config`. Restricted to ASCII
/// alphanumerics and `-_.:` so it can be embedded in backend-side names.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrontendType(Arc<str>);

impl FrontendType {
    pub fn new(name: impl AsRef<str>) -> Result<Self, NameError> {
        let name = name.as_ref();
        check_len(name)?;
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
        {
            return Err(NameError::IllegalCharacter(c));
        }

        Ok(FrontendType(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrontendIdentifier {
    member: MemberName,
    client_type: FrontendType,
}

impl FrontendIdentifier {
    pub fn new(member: MemberName, client_type: FrontendType) -> Self {
        FrontendIdentifier { member, client_type }
    }

    pub fn member(&self) -> &MemberName {
        &self.member
    }

    pub fn client_type(&self) -> &FrontendType {
        &self.client_type
    }
}

impl WireFormat for MemberName {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        put_str(buf, &self.0);
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        let raw = get_str(buf, "member name")?;
        MemberName::new(raw).map_err(|e| FormatError::Invalid {
            field: "member name",
            reason: e.to_string(),
        })
    }
}

impl WireFormat for FrontendType {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        put_str(buf, &self.0);
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        let raw = get_str(buf, "frontend type")?;
        FrontendType::new(raw).map_err(|e| FormatError::Invalid {
            field: "frontend type",
            reason: e.to_string(),
        })
    }
}

impl WireFormat for FrontendIdentifier {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        self.member.write_to(buf);
        self.client_type.write_to(buf);
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        let member = MemberName::read_from(buf)?;
        let client_type = FrontendType::read_from(buf)?;
        Ok(FrontendIdentifier { member, client_type })
    }
}

impl fmt::Debug for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FrontendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FrontendIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-frontend-{:?}", self.member, self.client_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_malformed_names() {
        assert_eq!(MemberName::new(""), Err(NameError::Empty));
        assert_eq!(FrontendType::new(""), Err(NameError::Empty));
        assert_eq!(FrontendType::new("data store"), Err(NameError::IllegalCharacter(' ')));
        assert_eq!(
            MemberName::new("m".repeat(MAX_NAME_LEN + 1)),
            Err(NameError::TooLong(MAX_NAME_LEN + 1))
        );
    }

    #[test]
    fn names_are_structurally_equal() {
        let a = MemberName::new("member-1").unwrap();
        let b = MemberName::new(String::from("member-1")).unwrap();
        assert_eq!(a, b);
        assert!(MemberName::new("member-1").unwrap() < MemberName::new("member-2").unwrap());
    }

    #[test]
    fn frontend_orders_by_member_then_type() {
        let fe = |m: &str, t: &str| FrontendIdentifier::new(MemberName::new(m).unwrap(), FrontendType::new(t).unwrap());

        assert!(fe("member-1", "zzz") < fe("member-2", "aaa"));
        assert!(fe("member-1", "config") < fe("member-1", "operational"));
        assert_eq!(format!("{:?}", fe("member-1", "config")), "member-1-frontend-config");
    }
}
