//! GDS operation codes and handshake constants.

use crate::error::ProtocolError;

/// Connect version sent in `op_connect`.
pub const CONNECT_VERSION2: i32 = 2;

/// Remote protocol version 10 (Firebird 1.x and later).
pub const PROTOCOL_VERSION10: i32 = 10;

/// Generic architecture: the server uses XDR for everything.
pub const ARCH_GENERIC: i32 = 1;

/// Minimum protocol type: remote procedure call.
pub const PTYPE_RPC: i32 = 2;

/// Maximum protocol type: batched sends.
pub const PTYPE_BATCH_SEND: i32 = 3;

/// `op_connect` user identification tags.
pub mod cnct {
    /// Operating system user name.
    pub const USER: u8 = 1;
    /// Client host name.
    pub const HOST: u8 = 4;
    /// Ask the server to verify the user.
    pub const USER_VERIFICATION: u8 = 6;
}

/// Operation codes understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Operation {
    /// Client handshake.
    Connect = 1,
    /// Server accepts handshake.
    Accept = 3,
    /// Server rejects handshake.
    Reject = 4,
    /// Close the network connection.
    Disconnect = 6,
    /// Generic response with status vector.
    Response = 9,
    /// Attach to a database.
    Attach = 19,
    /// Create a database.
    Create = 20,
    /// Detach from a database.
    Detach = 21,
    /// Start a transaction.
    Transaction = 29,
    /// Commit a transaction.
    Commit = 30,
    /// Roll back a transaction.
    Rollback = 31,
    /// First phase of a two-phase commit.
    Prepare = 32,
    /// Create a blob for writing.
    CreateBlob = 34,
    /// Open an existing blob for reading.
    OpenBlob = 35,
    /// Read blob segments.
    GetSegment = 36,
    /// Write one blob segment.
    PutSegment = 37,
    /// Discard a blob.
    CancelBlob = 38,
    /// Close a blob.
    CloseBlob = 39,
    /// Database information request.
    InfoDatabase = 40,
    /// Write several blob segments at once.
    BatchSegments = 44,
    /// Commit and keep the transaction context.
    CommitRetaining = 50,
    /// Two-phase prepare carrying a message.
    Prepare2 = 51,
    /// Allocate a statement handle.
    AllocateStatement = 62,
    /// Execute a statement.
    Execute = 63,
    /// Execute a statement without preparing it.
    ExecImmediate = 64,
    /// Fetch rows.
    Fetch = 65,
    /// Server row batch entry.
    FetchResponse = 66,
    /// Close or drop a statement.
    FreeStatement = 67,
    /// Prepare a statement.
    PrepareStatement = 68,
    /// Name a cursor.
    SetCursor = 69,
    /// Statement information request.
    InfoSql = 70,
    /// Keep-alive packet, ignored.
    Dummy = 71,
    /// Execute returning a singleton row.
    Execute2 = 76,
    /// Singleton row for `op_execute2`.
    SqlResponse = 78,
    /// Drop the attached database.
    DropDatabase = 81,
    /// Roll back and keep the transaction context.
    RollbackRetaining = 86,
    /// Liveness ping.
    Ping = 93,
}

impl Operation {
    /// Map a raw operation code.
    pub fn from_i32(value: i32) -> Result<Self, ProtocolError> {
        Ok(match value {
            1 => Self::Connect,
            3 => Self::Accept,
            4 => Self::Reject,
            6 => Self::Disconnect,
            9 => Self::Response,
            19 => Self::Attach,
            20 => Self::Create,
            21 => Self::Detach,
            29 => Self::Transaction,
            30 => Self::Commit,
            31 => Self::Rollback,
            32 => Self::Prepare,
            34 => Self::CreateBlob,
            35 => Self::OpenBlob,
            36 => Self::GetSegment,
            37 => Self::PutSegment,
            38 => Self::CancelBlob,
            39 => Self::CloseBlob,
            40 => Self::InfoDatabase,
            44 => Self::BatchSegments,
            50 => Self::CommitRetaining,
            51 => Self::Prepare2,
            62 => Self::AllocateStatement,
            63 => Self::Execute,
            64 => Self::ExecImmediate,
            65 => Self::Fetch,
            66 => Self::FetchResponse,
            67 => Self::FreeStatement,
            68 => Self::PrepareStatement,
            69 => Self::SetCursor,
            70 => Self::InfoSql,
            71 => Self::Dummy,
            76 => Self::Execute2,
            78 => Self::SqlResponse,
            81 => Self::DropDatabase,
            86 => Self::RollbackRetaining,
            93 => Self::Ping,
            other => return Err(ProtocolError::UnknownOperation(other)),
        })
    }

    /// Wire value of this operation.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// `op_free_statement` options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FreeOption {
    /// Close the cursor, keep the handle.
    Close = 1,
    /// Release the handle.
    Drop = 2,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_codes() {
        assert_eq!(Operation::from_i32(9).unwrap(), Operation::Response);
        assert_eq!(Operation::from_i32(66).unwrap(), Operation::FetchResponse);
        assert_eq!(Operation::Execute2.code(), 76);
        assert_eq!(Operation::RollbackRetaining.code(), 86);
        assert_eq!(Operation::from_i32(36).unwrap(), Operation::GetSegment);
        assert_eq!(Operation::BatchSegments.code(), 44);
    }

    #[test]
    fn test_unknown_operation() {
        assert_eq!(
            Operation::from_i32(500),
            Err(ProtocolError::UnknownOperation(500))
        );
    }
}
