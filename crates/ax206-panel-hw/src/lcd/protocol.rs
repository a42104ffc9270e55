//! AX206 command channel definitions and encoding.
//!
//! Protocol structure (mass-storage bulk-only transport, reused as a generic
//! command pipe):
//! - Command envelope: 31 bytes, signature "USBC", carries a 16-byte command block
//! - Optional data phase: payload of the length announced in the envelope
//! - Status reply: 13 bytes, signature "USBS", return code at offset 12

/// Command envelope size.
pub const ENVELOPE_SIZE: usize = 31;

/// Status reply size.
pub const STATUS_SIZE: usize = 13;

/// Command block size carried inside the envelope.
pub const COMMAND_SIZE: usize = 16;

/// Envelope signature ("USBC").
pub const ENVELOPE_SIGNATURE: [u8; 4] = *b"USBC";

/// Status reply signature ("USBS").
pub const STATUS_SIGNATURE: [u8; 4] = *b"USBS";

/// Envelope tag. Constant because calls are strictly serialized.
pub const ENVELOPE_TAG: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// First byte of every vendor command block.
pub const COMMAND_PREFIX: u8 = 0xCD;

/// Size of the "get parameters" reply.
pub const PARAMETERS_SIZE: usize = 5;

/// A 16-byte vendor command block.
pub type CommandBlock = [u8; COMMAND_SIZE];

/// Vendor command selector (command block byte 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Read panel parameters (width, height).
    GetParameters = 0x02,
    /// Extended command, sub-opcode in byte 6.
    Extended = 0x06,
}

/// Extended command sub-opcodes (command block byte 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtendedCommand {
    /// Set a device property.
    SetProperty = 0x01,
    /// Blit RGB565 data to a screen rectangle.
    Blit = 0x12,
}

/// Device properties for [`ExtendedCommand::SetProperty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Property {
    /// Backlight brightness, 0-7.
    Brightness = 0x01,
}

/// Highest accepted backlight level.
pub const MAX_BACKLIGHT: u16 = 7;

/// Screen rectangle with exclusive right/bottom bounds: `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: u16,
    pub y0: u16,
    pub x1: u16,
    pub y1: u16,
}

impl Rect {
    /// Creates a rectangle from exclusive bounds.
    pub fn new(x0: u16, y0: u16, x1: u16, y1: u16) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0) as usize
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0) as usize
    }

    /// Number of RGB565 bytes needed to cover this rectangle.
    pub fn byte_len(&self) -> usize {
        self.width() * self.height() * crate::BYTES_PER_PIXEL
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x0, self.y0, self.x1, self.y1)
    }
}

fn command_block(command: Command) -> CommandBlock {
    let mut block = [0u8; COMMAND_SIZE];
    block[0] = COMMAND_PREFIX;
    block[5] = command as u8;
    block
}

fn extended_block(sub: ExtendedCommand) -> CommandBlock {
    let mut block = command_block(Command::Extended);
    block[6] = sub as u8;
    block
}

/// Builds the "get panel parameters" command block.
pub fn build_parameters_command() -> CommandBlock {
    command_block(Command::GetParameters)
}

/// Builds a blit command block. The device takes inclusive end coordinates.
pub fn build_blit_command(rect: Rect) -> CommandBlock {
    let mut block = extended_block(ExtendedCommand::Blit);
    block[7..9].copy_from_slice(&rect.x0.to_le_bytes());
    block[9..11].copy_from_slice(&rect.y0.to_le_bytes());
    block[11..13].copy_from_slice(&rect.x1.wrapping_sub(1).to_le_bytes());
    block[13..15].copy_from_slice(&rect.y1.wrapping_sub(1).to_le_bytes());
    block[15] = 0;
    block
}

/// Builds a "set property" command block.
pub fn build_property_command(property: Property, value: u16) -> CommandBlock {
    let mut block = extended_block(ExtendedCommand::SetProperty);
    block[7..9].copy_from_slice(&(property as u16).to_le_bytes());
    block[9..11].copy_from_slice(&value.to_le_bytes());
    block
}

/// Builds the 31-byte command envelope.
pub fn build_envelope(command: &CommandBlock, data_len: u32) -> [u8; ENVELOPE_SIZE] {
    let mut envelope = [0u8; ENVELOPE_SIZE];
    envelope[0..4].copy_from_slice(&ENVELOPE_SIGNATURE);
    envelope[4..8].copy_from_slice(&ENVELOPE_TAG);
    envelope[8..12].copy_from_slice(&data_len.to_le_bytes());
    envelope[12] = 0x00; // flags
    envelope[13] = 0x00; // LUN
    envelope[14] = COMMAND_SIZE as u8;
    envelope[15..].copy_from_slice(command);
    envelope
}

/// Parsed 13-byte status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReply {
    bytes: [u8; STATUS_SIZE],
}

impl StatusReply {
    pub fn from_bytes(bytes: [u8; STATUS_SIZE]) -> Self {
        Self { bytes }
    }

    /// The first four bytes of the reply.
    pub fn signature(&self) -> [u8; 4] {
        [self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]
    }

    pub fn is_valid(&self) -> bool {
        self.signature() == STATUS_SIGNATURE
    }

    /// Peer-reported return code, not interpreted by the transport.
    pub fn return_code(&self) -> u8 {
        self.bytes[12]
    }
}

/// Decodes the "get parameters" reply into (width, height).
pub fn parse_parameters(reply: &[u8; PARAMETERS_SIZE]) -> (u16, u16) {
    let width = u16::from_le_bytes([reply[0], reply[1]]);
    let height = u16::from_le_bytes([reply[2], reply[3]]);
    (width, height)
}
