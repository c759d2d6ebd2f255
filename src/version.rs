//! `HTTP-version = HTTP-name "/" DIGIT "." DIGIT`, carried over from the
//! teacher's `HttpVersion` (`spec.rs`) with the same constants.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub fn to_string(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

pub const HTTP_0_9: HttpVersion = HttpVersion { major: 0, minor: 9 };
pub const HTTP_1_0: HttpVersion = HttpVersion { major: 1, minor: 0 };
pub const HTTP_1_1: HttpVersion = HttpVersion { major: 1, minor: 1 };
