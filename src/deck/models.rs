//! Stream Deck model table
//!
//! Only the JPEG-protocol generation is listed; the original 15-key deck
//! and the Mini speak a BMP protocol with a different report layout.

use crate::frame::Panel;

/// USB vendor id of Elgato
pub const ELGATO_VENDOR_ID: u16 = 0x0fd9;

/// Orientation fix applied to each key image before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFlip {
    None,
    /// Mirror horizontally and vertically (180° rotation)
    Both,
}

/// Static description of one model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckModel {
    pub name: &'static str,
    pub product_id: u16,
    pub rows: u32,
    pub columns: u32,
    /// Key image edge in pixels
    pub key_size: u32,
    pub flip: KeyFlip,
}

impl DeckModel {
    pub const fn panel(&self) -> Panel {
        Panel::new(self.rows, self.columns, self.key_size)
    }

    pub const fn key_count(&self) -> usize {
        (self.rows * self.columns) as usize
    }
}

pub const MODELS: &[DeckModel] = &[
    DeckModel {
        name: "Stream Deck Original V2",
        product_id: 0x006d,
        rows: 3,
        columns: 5,
        key_size: 72,
        flip: KeyFlip::Both,
    },
    DeckModel {
        name: "Stream Deck MK.2",
        product_id: 0x0080,
        rows: 3,
        columns: 5,
        key_size: 72,
        flip: KeyFlip::Both,
    },
    DeckModel {
        name: "Stream Deck MK.2 (Scissor)",
        product_id: 0x00a5,
        rows: 3,
        columns: 5,
        key_size: 72,
        flip: KeyFlip::Both,
    },
    DeckModel {
        name: "Stream Deck XL",
        product_id: 0x006c,
        rows: 4,
        columns: 8,
        key_size: 96,
        flip: KeyFlip::Both,
    },
    DeckModel {
        name: "Stream Deck XL V2",
        product_id: 0x008f,
        rows: 4,
        columns: 8,
        key_size: 96,
        flip: KeyFlip::Both,
    },
    DeckModel {
        name: "Stream Deck +",
        product_id: 0x0084,
        rows: 2,
        columns: 4,
        key_size: 120,
        flip: KeyFlip::None,
    },
];

/// Look up a supported model by USB product id
pub fn find_model(product_id: u16) -> Option<&'static DeckModel> {
    MODELS.iter().find(|m| m.product_id == product_id)
}
