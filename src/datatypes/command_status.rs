use num_enum::{FromPrimitive, IntoPrimitive};

/// The command_status of a submit_sm_resp as reported back by the session.
///
/// Only the codes the dispatch core reasons about are named; everything else
/// is carried verbatim in [`CommandStatus::Other`] so it can be written to the
/// outbound log unchanged.
#[derive(FromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    /// No Error
    Ok = 0x00000000,

    /// Message Length is invalid
    InvalidMsgLength = 0x00000001,

    /// Incorrect BIND Status for given command
    IncorrectBindStatus = 0x00000004,

    /// System Error
    SystemError = 0x00000008,

    /// Invalid Source Address
    InvalidSourceAddress = 0x0000000A,

    /// Invalid Dest Addr
    InvalidDestinationAddress = 0x0000000B,

    /// Message Queue Full
    MessageQueueFull = 0x00000014,

    /// submit_sm or submit_multi failed
    SubmitFailed = 0x00000045,

    /// Throttling error (ESME has exceeded allowed message limits)
    ThrottlingError = 0x00000058,

    /// Invalid message validity period (Expiry time)
    InvalidExpiryTime = 0x00000062,

    /// Unknown Error
    UnknownError = 0x000000FF,

    /// Any status the core does not name, including vendor specific codes.
    #[num_enum(catch_all)]
    Other(u32),
}

impl CommandStatus {
    /// Returns true for ESME_ROK.
    pub fn is_ok(self) -> bool {
        self == CommandStatus::Ok
    }

    /// Numeric result code as persisted in the outbound log.
    pub fn result_code(self) -> i64 {
        i64::from(u32::from(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_variants() {
        assert_eq!(CommandStatus::from(0u32), CommandStatus::Ok);
        assert_eq!(CommandStatus::from(0x58u32), CommandStatus::ThrottlingError);
    }

    #[test]
    fn vendor_codes_are_preserved() {
        let status = CommandStatus::from(0x0000_0401u32);
        assert_eq!(status, CommandStatus::Other(0x401));
        assert_eq!(status.result_code(), 0x401);
        assert!(!status.is_ok());
    }
}
