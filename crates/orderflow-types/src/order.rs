//! Order domain event and its wire codec.
//!
//! The event is encoded in proto3 wire format so that consumers built
//! against an older or newer layout can still read it:
//!
//! ```text
//! message OrderEvent {
//!   string order_id = 1;
//!   string product  = 2;
//!   double price    = 3;
//! }
//! ```
//!
//! Unknown field numbers are skipped on decode.

use crate::error::{Result, TypesError};
use protobuf::{CodedInputStream, CodedOutputStream};

const ORDER_ID_FIELD: u32 = 1;
const PRODUCT_FIELD: u32 = 2;
const PRICE_FIELD: u32 = 3;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_FIXED32: u32 = 5;

/// An order placed through the inbound API.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub order_id: String,
    pub product: String,
    pub price: f64,
}

impl OrderEvent {
    pub fn new(order_id: impl Into<String>, product: impl Into<String>, price: f64) -> Self {
        Self {
            order_id: order_id.into(),
            product: product.into(),
            price,
        }
    }

    /// Record key: all events for one order land on the same partition.
    pub fn key(&self) -> &str {
        &self.order_id
    }

    /// Encode to protobuf binary format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut buffer);
            stream
                .write_string(ORDER_ID_FIELD, &self.order_id)
                .map_err(|e| TypesError::Encode(e.to_string()))?;
            stream
                .write_string(PRODUCT_FIELD, &self.product)
                .map_err(|e| TypesError::Encode(e.to_string()))?;
            stream
                .write_double(PRICE_FIELD, self.price)
                .map_err(|e| TypesError::Encode(e.to_string()))?;
            stream
                .flush()
                .map_err(|e| TypesError::Encode(e.to_string()))?;
        }
        Ok(buffer)
    }

    /// Decode from protobuf binary format.
    ///
    /// `order_id` and `product` are required; a missing `price` decodes as
    /// the proto3 default of `0.0` and is left for the caller to validate.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut stream = CodedInputStream::from_bytes(data);
        let mut order_id = None;
        let mut product = None;
        let mut price = 0.0;

        while !stream
            .eof()
            .map_err(|e| TypesError::Decode(e.to_string()))?
        {
            let tag = stream
                .read_raw_varint32()
                .map_err(|e| TypesError::Decode(e.to_string()))?;
            if tag == 0 {
                return Err(TypesError::Decode("zero tag".to_string()));
            }
            let field_number = tag >> 3;
            let wire_type = tag & 0x7;

            match (field_number, wire_type) {
                (ORDER_ID_FIELD, WIRE_LENGTH_DELIMITED) => {
                    order_id = Some(
                        stream
                            .read_string()
                            .map_err(|e| TypesError::Decode(e.to_string()))?,
                    );
                }
                (PRODUCT_FIELD, WIRE_LENGTH_DELIMITED) => {
                    product = Some(
                        stream
                            .read_string()
                            .map_err(|e| TypesError::Decode(e.to_string()))?,
                    );
                }
                (PRICE_FIELD, WIRE_FIXED64) => {
                    price = stream
                        .read_double()
                        .map_err(|e| TypesError::Decode(e.to_string()))?;
                }
                (ORDER_ID_FIELD | PRODUCT_FIELD | PRICE_FIELD, _) => {
                    return Err(TypesError::WireType {
                        field_number,
                        wire_type,
                    });
                }
                _ => skip_field(&mut stream, field_number, wire_type)?,
            }
        }

        Ok(Self {
            order_id: order_id.ok_or(TypesError::MissingField("order_id"))?,
            product: product.ok_or(TypesError::MissingField("product"))?,
            price,
        })
    }
}

fn skip_field(stream: &mut CodedInputStream, field_number: u32, wire_type: u32) -> Result<()> {
    let skipped = match wire_type {
        WIRE_VARINT => stream.read_raw_varint64().map(drop),
        WIRE_FIXED64 => stream.read_fixed64().map(drop),
        WIRE_LENGTH_DELIMITED => stream.read_bytes().map(drop),
        WIRE_FIXED32 => stream.read_fixed32().map(drop),
        _ => {
            return Err(TypesError::WireType {
                field_number,
                wire_type,
            })
        }
    };
    skipped.map_err(|e| TypesError::Decode(e.to_string()))
}
