use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Final message state carried by a delivery receipt, either in the
/// message_state TLV (0x0427) or as the `stat:` word of the receipt text.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageState {
    Enroute = 1,
    Delivered = 2,
    Expired = 3,
    Deleted = 4,
    Undeliverable = 5,
    Accepted = 6,
    Unknown = 7,
    Rejected = 8,
}

impl MessageState {
    /// Maps the seven-letter `stat:` word of a receipt body.
    ///
    /// Only the words message centres actually send in final receipts are
    /// recognised; anything else returns `None`.
    pub fn from_receipt_stat(stat: &str) -> Option<Self> {
        match stat {
            "ACCEPTD" => Some(MessageState::Accepted),
            "DELIVRD" => Some(MessageState::Delivered),
            "REJECTD" => Some(MessageState::Rejected),
            "UNDELIV" => Some(MessageState::Undeliverable),
            "EXPIRED" => Some(MessageState::Expired),
            _ => None,
        }
    }
}

/// Numeric delivery status for a receipt `stat:` word, `0` when unrecognised.
pub fn delivery_status(stat: &str) -> u8 {
    MessageState::from_receipt_stat(stat).map_or(0, u8::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_words_map_to_state_codes() {
        assert_eq!(delivery_status("ACCEPTD"), 6);
        assert_eq!(delivery_status("DELIVRD"), 2);
        assert_eq!(delivery_status("REJECTD"), 8);
        assert_eq!(delivery_status("UNDELIV"), 5);
        assert_eq!(delivery_status("EXPIRED"), 3);
    }

    #[test]
    fn unknown_words_map_to_zero() {
        assert_eq!(delivery_status("UNKNOWN"), 0);
        assert_eq!(delivery_status(""), 0);
        assert_eq!(delivery_status("delivrd"), 0);
    }

    #[test]
    fn raw_octets_convert() {
        assert_eq!(MessageState::try_from(5u8).ok(), Some(MessageState::Undeliverable));
        assert!(MessageState::try_from(42u8).is_err());
    }
}
