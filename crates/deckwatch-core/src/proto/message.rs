//! Message framing over protocol fields
//!
//! A message is a fixed envelope (magic, transaction id, type, argument
//! count, argument-type list) followed by its argument fields. Menu-style
//! responses arrive as a header message, N item messages, and a footer
//! sentinel, and archives reuse the footer to delimit item streams.

use super::{Field, ProtoError};
use std::io::{Read, Write};

/// Sentinel value every message starts with
const MESSAGE_MAGIC: u64 = 0x872349ae;

/// Result-count value meaning a menu request matched nothing
pub const NO_MENU_RESULTS_AVAILABLE: u64 = 0xffff_ffff;

/// The argument-type list is a fixed-size blob, one tag byte per argument
const ARGUMENT_TYPE_LIST_LEN: usize = 17;

/// Message type codes we understand
///
/// Request codes are sent by us; response codes come back from the device.
/// Anything else is carried through as [`MessageKind::Other`] so unknown
/// traffic still round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    // requests
    TrackListReq,
    MetadataReq,
    AlbumArtReq,
    WavePreviewReq,
    CueListReq,
    BeatGridReq,
    WaveDetailReq,
    PlaylistReq,
    RenderMenuReq,
    // responses
    MenuAvailable,
    MenuHeader,
    AlbumArt,
    MenuItem,
    MenuFooter,
    WavePreview,
    BeatGrid,
    CueList,
    WaveDetail,
    /// A type code we do not recognize
    Other(u16),
}

impl MessageKind {
    pub fn from_value(value: u16) -> Self {
        match value {
            0x1004 => MessageKind::TrackListReq,
            0x2002 => MessageKind::MetadataReq,
            0x2003 => MessageKind::AlbumArtReq,
            0x2004 => MessageKind::WavePreviewReq,
            0x2104 => MessageKind::CueListReq,
            0x2204 => MessageKind::BeatGridReq,
            0x2904 => MessageKind::WaveDetailReq,
            0x1105 => MessageKind::PlaylistReq,
            0x3000 => MessageKind::RenderMenuReq,
            0x4000 => MessageKind::MenuAvailable,
            0x4001 => MessageKind::MenuHeader,
            0x4002 => MessageKind::AlbumArt,
            0x4101 => MessageKind::MenuItem,
            0x4201 => MessageKind::MenuFooter,
            0x4402 => MessageKind::WavePreview,
            0x4602 => MessageKind::BeatGrid,
            0x4702 => MessageKind::CueList,
            0x4a02 => MessageKind::WaveDetail,
            other => MessageKind::Other(other),
        }
    }

    pub fn value(&self) -> u16 {
        match self {
            MessageKind::TrackListReq => 0x1004,
            MessageKind::MetadataReq => 0x2002,
            MessageKind::AlbumArtReq => 0x2003,
            MessageKind::WavePreviewReq => 0x2004,
            MessageKind::CueListReq => 0x2104,
            MessageKind::BeatGridReq => 0x2204,
            MessageKind::WaveDetailReq => 0x2904,
            MessageKind::PlaylistReq => 0x1105,
            MessageKind::RenderMenuReq => 0x3000,
            MessageKind::MenuAvailable => 0x4000,
            MessageKind::MenuHeader => 0x4001,
            MessageKind::AlbumArt => 0x4002,
            MessageKind::MenuItem => 0x4101,
            MessageKind::MenuFooter => 0x4201,
            MessageKind::WavePreview => 0x4402,
            MessageKind::BeatGrid => 0x4602,
            MessageKind::CueList => 0x4702,
            MessageKind::WaveDetail => 0x4a02,
            MessageKind::Other(value) => *value,
        }
    }
}

/// Which menu a menu-style request renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuTarget {
    MainMenu,
    SubMenu,
    /// Non-menu data queries (cue lists, waveforms, art)
    Data,
}

impl MenuTarget {
    pub fn value(&self) -> u8 {
        match self {
            MenuTarget::MainMenu => 1,
            MenuTarget::SubMenu => 2,
            MenuTarget::Data => 8,
        }
    }
}

/// The kind of row a menu item message describes, carried in its sixth
/// argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItemType {
    AlbumTitle,
    Title,
    Genre,
    Artist,
    Rating,
    Duration,
    Tempo,
    Key,
    Comment,
    DateAdded,
    /// One track row in a track or playlist listing
    TrackListEntry,
    Other(u16),
}

impl MenuItemType {
    pub fn from_value(value: u16) -> Self {
        match value {
            0x0002 => MenuItemType::AlbumTitle,
            0x0004 => MenuItemType::Title,
            0x0006 => MenuItemType::Genre,
            0x0007 => MenuItemType::Artist,
            0x000a => MenuItemType::Rating,
            0x000b => MenuItemType::Duration,
            0x000d => MenuItemType::Tempo,
            0x000f => MenuItemType::Key,
            0x0023 => MenuItemType::Comment,
            0x002e => MenuItemType::DateAdded,
            0x0704 => MenuItemType::TrackListEntry,
            other => MenuItemType::Other(other),
        }
    }

    pub fn value(&self) -> u16 {
        match self {
            MenuItemType::AlbumTitle => 0x0002,
            MenuItemType::Title => 0x0004,
            MenuItemType::Genre => 0x0006,
            MenuItemType::Artist => 0x0007,
            MenuItemType::Rating => 0x000a,
            MenuItemType::Duration => 0x000b,
            MenuItemType::Tempo => 0x000d,
            MenuItemType::Key => 0x000f,
            MenuItemType::Comment => 0x0023,
            MenuItemType::DateAdded => 0x002e,
            MenuItemType::TrackListEntry => 0x0704,
            MenuItemType::Other(value) => *value,
        }
    }
}

/// A frozen protocol message
///
/// Menu item argument layout, for the messages we interpret:
/// `[0]` parent id, `[1]` item id or numeric value, `[2]` first label byte
/// length, `[3]` first label, `[4]` second label byte length, `[5]` second
/// label, `[6]` item type, `[7]` flags, `[8]` artwork id. Data responses
/// (cue list, waveforms, art, beat grid) carry their payload blob in
/// argument 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub transaction: u32,
    pub kind: MessageKind,
    pub arguments: Vec<Field>,
}

impl Message {
    pub fn new(transaction: u32, kind: MessageKind, arguments: Vec<Field>) -> Self {
        Self { transaction, kind, arguments }
    }

    /// The footer sentinel used to terminate item streams
    pub fn menu_footer() -> Self {
        Self::new(0, MessageKind::MenuFooter, Vec::new())
    }

    /// Read one complete message from the stream
    pub fn read(input: &mut impl Read) -> Result<Message, ProtoError> {
        let magic = expect_number(input, "magic")?;
        if magic != MESSAGE_MAGIC {
            return Err(ProtoError::Corrupt(format!(
                "bad message magic {:#010x}",
                magic
            )));
        }
        let transaction = expect_number(input, "transaction id")? as u32;
        let kind = MessageKind::from_value(expect_number(input, "message type")? as u16);
        let count = expect_number(input, "argument count")? as usize;
        let type_list = match Field::read(input)? {
            Field::Binary(bytes) => bytes,
            other => {
                return Err(ProtoError::Corrupt(format!(
                    "expected argument-type list, got {:?}",
                    other
                )))
            }
        };
        if type_list.len() != ARGUMENT_TYPE_LIST_LEN || count > ARGUMENT_TYPE_LIST_LEN {
            return Err(ProtoError::Corrupt(format!(
                "argument list describes {} of {} entries",
                count,
                type_list.len()
            )));
        }
        let mut arguments = Vec::with_capacity(count);
        for _ in 0..count {
            arguments.push(Field::read(input)?);
        }
        Ok(Message { transaction, kind, arguments })
    }

    /// Write this message byte-identically to what [`Message::read`] consumed
    pub fn write(&self, output: &mut impl Write) -> Result<(), ProtoError> {
        Field::number(MESSAGE_MAGIC as u32).write(output)?;
        Field::number(self.transaction).write(output)?;
        Field::number2(self.kind.value()).write(output)?;
        Field::number1(self.arguments.len() as u8).write(output)?;
        let mut type_list = vec![0u8; ARGUMENT_TYPE_LIST_LEN];
        for (i, argument) in self.arguments.iter().enumerate().take(ARGUMENT_TYPE_LIST_LEN) {
            type_list[i] = argument.argument_tag();
        }
        Field::Binary(type_list).write(output)?;
        for argument in &self.arguments {
            argument.write(output)?;
        }
        Ok(())
    }

    /// This message serialized to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    pub fn argument_number(&self, index: usize) -> Option<u64> {
        self.arguments.get(index).and_then(Field::as_number)
    }

    pub fn argument_binary(&self, index: usize) -> Option<&[u8]> {
        self.arguments.get(index).and_then(Field::as_binary)
    }

    pub fn argument_text(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).and_then(Field::as_text)
    }

    /// The result count of a menu response header; `NO_MENU_RESULTS_AVAILABLE`
    /// means the query matched nothing
    pub fn menu_results_count(&self) -> Option<u64> {
        self.argument_number(1)
    }

    /// The row type of a menu item message
    pub fn menu_item_type(&self) -> Option<MenuItemType> {
        self.argument_number(6).map(|v| MenuItemType::from_value(v as u16))
    }
}

fn expect_number(input: &mut impl Read, what: &str) -> Result<u64, ProtoError> {
    match Field::read(input)? {
        Field::Number { value, .. } => Ok(value),
        other => Err(ProtoError::Corrupt(format!("expected {} number, got {:?}", what, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> Message {
        Message::new(
            7,
            MessageKind::MenuItem,
            vec![
                Field::number(0),
                Field::number(42),
                Field::number(10),
                Field::Text("Earthbeat".to_string()),
                Field::number(0),
                Field::Text(String::new()),
                Field::number2(MenuItemType::Title.value()),
                Field::number(0),
                Field::number(9001),
            ],
        )
    }

    #[test]
    fn test_message_round_trips_byte_identically() {
        let message = sample_item();
        let bytes = message.to_bytes().unwrap();
        let read_back = Message::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(read_back, message);
        assert_eq!(read_back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_menu_accessors() {
        let item = sample_item();
        assert_eq!(item.menu_item_type(), Some(MenuItemType::Title));
        assert_eq!(item.argument_text(3), Some("Earthbeat"));
        assert_eq!(item.argument_number(8), Some(9001));

        let header = Message::new(
            1,
            MessageKind::MenuAvailable,
            vec![Field::number(0x2002), Field::number(3)],
        );
        assert_eq!(header.menu_results_count(), Some(3));
    }

    #[test]
    fn test_footer_round_trips() {
        let bytes = Message::menu_footer().to_bytes().unwrap();
        let footer = Message::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(footer.kind, MessageKind::MenuFooter);
        assert!(footer.arguments.is_empty());
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let mut bytes = Vec::new();
        Field::number(0xdeadbeef).write(&mut bytes).unwrap();
        match Message::read(&mut bytes.as_slice()) {
            Err(ProtoError::Corrupt(_)) => {}
            other => panic!("expected Corrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_message_is_truncated() {
        let bytes = sample_item().to_bytes().unwrap();
        match Message::read(&mut bytes[..bytes.len() - 4].as_ref()) {
            Err(ProtoError::Truncated) => {}
            other => panic!("expected Truncated, got {:?}", other),
        }
    }
}
