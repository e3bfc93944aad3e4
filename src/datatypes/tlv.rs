use bytes::Bytes;

/// receipted_message_id: message id assigned by the SMSC to the original submit.
pub const RECEIPTED_MESSAGE_ID: u16 = 0x001E;

/// message_state: final state of the receipted message, one octet.
pub const MESSAGE_STATE: u16 = 0x0427;

/// Optional parameter attached to a received PDU.
#[derive(Clone, Debug, PartialEq)]
pub struct Tlv {
    /// The Tag field is used to uniquely identify the particular optional parameter in question.
    pub tag: u16,

    /// The Value field contains the actual data for the optional parameter in question.
    /// The Length field is implied by `value.len()`.
    pub value: Bytes,
}

impl Tlv {
    pub fn new(tag: u16, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// C-Octet string view of the value with NUL padding removed from both ends.
    pub fn as_c_string(&self) -> String {
        String::from_utf8_lossy(&self.value)
            .trim_matches('\0')
            .to_string()
    }

    /// First octet of the value, if any.
    pub fn first_octet(&self) -> Option<u8> {
        self.value.first().copied()
    }
}
