//! Typed ids for the episodic memory pipeline's service layer.
//!
//! Storage (component F) stores these as raw `i64`/`String` columns — its
//! schema and queries were built and tested against those primitives and are
//! left unchanged. These newtypes exist at the Tracker/ETL/Dispatcher
//! boundary, where the spec calls out `ChannelMemoryState`/`PendingMessageRef`
//! as distinctly-typed identifiers; conversion to/from the raw primitives
//! happens at the `Storage` call site.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChannelId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GuildId(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserId(pub String);

macro_rules! i64_newtype {
    ($t:ty) => {
        impl From<i64> for $t {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
        impl From<$t> for i64 {
            fn from(v: $t) -> Self {
                v.0
            }
        }
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

i64_newtype!(ChannelId);
i64_newtype!(MessageId);
i64_newtype!(GuildId);

impl From<String> for UserId {
    fn from(v: String) -> Self {
        Self(v)
    }
}
impl From<UserId> for String {
    fn from(v: UserId) -> Self {
        v.0
    }
}
impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
