//! Which LOB operations remain usable after `free()`.

use std::fmt;

/// Operations subject to the free policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobOperation {
    Length,
    GetBytes,
    GetStream,
    GetStreamRange,
    Position,
    SetBytes,
    SetStream,
    Truncate,
    Free,
    /// Reading from a stream opened before the LOB was freed.
    StreamRead,
    /// Writing to a stream opened before the LOB was freed.
    StreamWrite,
}

impl LobOperation {
    pub const ALL: [LobOperation; 11] = [
        LobOperation::Length,
        LobOperation::GetBytes,
        LobOperation::GetStream,
        LobOperation::GetStreamRange,
        LobOperation::Position,
        LobOperation::SetBytes,
        LobOperation::SetStream,
        LobOperation::Truncate,
        LobOperation::Free,
        LobOperation::StreamRead,
        LobOperation::StreamWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LobOperation::Length => "length",
            LobOperation::GetBytes => "get_bytes",
            LobOperation::GetStream => "get_stream",
            LobOperation::GetStreamRange => "get_stream_range",
            LobOperation::Position => "position",
            LobOperation::SetBytes => "set_bytes",
            LobOperation::SetStream => "set_stream",
            LobOperation::Truncate => "truncate",
            LobOperation::Free => "free",
            LobOperation::StreamRead => "stream_read",
            LobOperation::StreamWrite => "stream_write",
        }
    }
}

impl fmt::Display for LobOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour of an operation on a freed LOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFree {
    /// Fails with `XJ215`.
    Reject,
    /// Proceeds as if the LOB were still live.
    Permit,
}

const EMBEDDED: &[(LobOperation, AfterFree)] = &[
    (LobOperation::Length, AfterFree::Reject),
    (LobOperation::GetBytes, AfterFree::Reject),
    (LobOperation::GetStream, AfterFree::Reject),
    (LobOperation::GetStreamRange, AfterFree::Reject),
    (LobOperation::Position, AfterFree::Reject),
    (LobOperation::SetBytes, AfterFree::Reject),
    (LobOperation::SetStream, AfterFree::Reject),
    (LobOperation::Truncate, AfterFree::Reject),
    (LobOperation::Free, AfterFree::Permit),
    (LobOperation::StreamRead, AfterFree::Reject),
    (LobOperation::StreamWrite, AfterFree::Reject),
];

const CLIENT: &[(LobOperation, AfterFree)] = &[
    (LobOperation::Length, AfterFree::Reject),
    (LobOperation::GetBytes, AfterFree::Reject),
    (LobOperation::GetStream, AfterFree::Reject),
    (LobOperation::GetStreamRange, AfterFree::Reject),
    (LobOperation::Position, AfterFree::Reject),
    (LobOperation::SetBytes, AfterFree::Reject),
    (LobOperation::SetStream, AfterFree::Reject),
    (LobOperation::Truncate, AfterFree::Reject),
    (LobOperation::Free, AfterFree::Permit),
    (LobOperation::StreamRead, AfterFree::Permit),
    (LobOperation::StreamWrite, AfterFree::Permit),
];

/// Static table of post-free behaviour, one entry per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreePolicy {
    name: &'static str,
    table: &'static [(LobOperation, AfterFree)],
}

impl FreePolicy {
    /// Only `free()` is allowed on a freed LOB.
    pub fn embedded() -> Self {
        Self {
            name: "embedded",
            table: EMBEDDED,
        }
    }

    /// Streams opened before `free()` may finish their work.
    pub fn client() -> Self {
        Self {
            name: "client",
            table: CLIENT,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entries(&self) -> &'static [(LobOperation, AfterFree)] {
        self.table
    }

    /// Looks up `op`. Operations missing from the table are rejected.
    pub fn after_free(&self, op: LobOperation) -> AfterFree {
        self.table
            .iter()
            .find(|(o, _)| *o == op)
            .map(|(_, a)| *a)
            .unwrap_or(AfterFree::Reject)
    }

    /// Returns whether `op` may run on a LOB in the given state.
    pub fn allows(&self, op: LobOperation, freed: bool) -> bool {
        !freed || self.after_free(op) == AfterFree::Permit
    }
}

impl Default for FreePolicy {
    fn default() -> Self {
        Self::embedded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_cover_every_operation() {
        for policy in [FreePolicy::embedded(), FreePolicy::client()] {
            assert_eq!(policy.entries().len(), LobOperation::ALL.len());
            for op in LobOperation::ALL {
                assert!(
                    policy.entries().iter().any(|(o, _)| *o == op),
                    "{} missing from {}",
                    op,
                    policy.name()
                );
            }
        }
    }

    #[test]
    fn test_only_free_and_open_streams_survive_free() {
        for policy in [FreePolicy::embedded(), FreePolicy::client()] {
            for (op, after) in policy.entries() {
                if *after == AfterFree::Permit {
                    assert!(matches!(
                        op,
                        LobOperation::Free | LobOperation::StreamRead | LobOperation::StreamWrite
                    ));
                }
            }
            assert_eq!(policy.after_free(LobOperation::Free), AfterFree::Permit);
        }
    }

    #[test]
    fn test_presets_differ_on_streams() {
        let embedded = FreePolicy::embedded();
        let client = FreePolicy::client();
        assert!(!embedded.allows(LobOperation::StreamRead, true));
        assert!(client.allows(LobOperation::StreamRead, true));
        assert!(client.allows(LobOperation::StreamWrite, true));
        assert!(!client.allows(LobOperation::Length, true));
        assert!(embedded.allows(LobOperation::Length, false));
    }
}
