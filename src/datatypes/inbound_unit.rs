use crate::datatypes::tlv::Tlv;

/// esm_class bits 5..2 value marking an SMSC delivery receipt.
const ESM_TYPE_DELIVERY_RECEIPT: u8 = 0b0001;

/// The parts of a received deliver_sm the gateway core consumes.
///
/// The session implementation decodes the PDU and hands this view over; the
/// core never touches the wire encoding. The deliver_sm PDU is used to deliver
/// both mobile originated messages and delivery receipts from the SMSC.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundUnit {
    /// 4.3.4 source_addr: Address of SME which originated this message.
    pub source_addr: String,

    /// 4.3.7 destination_addr: Destination address of this short message.
    pub destination_addr: String,

    /// 4.3.8 esm_class: Indicates Message Mode and Message Type.
    ///       Bits 5..2 set to 0001 mark an SMSC delivery receipt.
    pub esm_class: u8,

    /// 4.3.15 data_coding: Defines the encoding scheme of the short message user data.
    pub data_coding: u8,

    /// 4.3.18 short_message: decoded user data. For delivery receipts this is the
    ///        receipt text (`id:... stat:... err:...`).
    pub short_message: String,

    /// Optional parameters in the order they were received.
    pub tlvs: Vec<Tlv>,
}

impl InboundUnit {
    /// A mobile originated message with default coding and no optional parameters.
    pub fn new(
        source_addr: impl Into<String>,
        destination_addr: impl Into<String>,
        short_message: impl Into<String>,
    ) -> Self {
        Self {
            source_addr: source_addr.into(),
            destination_addr: destination_addr.into(),
            esm_class: 0,
            data_coding: 0,
            short_message: short_message.into(),
            tlvs: Vec::new(),
        }
    }

    /// Marks the unit as an SMSC delivery receipt.
    pub fn as_delivery_receipt(mut self) -> Self {
        self.esm_class = (self.esm_class & !0x3C) | (ESM_TYPE_DELIVERY_RECEIPT << 2);
        self
    }

    pub fn with_data_coding(mut self, data_coding: u8) -> Self {
        self.data_coding = data_coding;
        self
    }

    pub fn with_tlv(mut self, tlv: Tlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    /// Returns true when esm_class flags this unit as a delivery receipt.
    pub fn is_delivery_receipt(&self) -> bool {
        (self.esm_class >> 2) & 0x0F == ESM_TYPE_DELIVERY_RECEIPT
    }

    /// First optional parameter carrying `tag`.
    pub fn tlv(&self, tag: u16) -> Option<&Tlv> {
        self.tlvs.iter().find(|tlv| tlv.tag == tag)
    }
}
