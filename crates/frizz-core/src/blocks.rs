//! Card component tree
//!
//! A published card is an ordered list of [`Block`]s using Discord's
//! components-v2 layout. Only containers, sections and action rows carry
//! children; action rows only ever carry buttons.
//!
//! On the wire every block is a JSON object tagged by an integer `type`.
//! Decoding goes through [`RawBlock`] so unknown codes are rejected instead
//! of silently dropped.
//!
//! Cards fetched back from Discord are held as a [`Card`]: the raw JSON,
//! checked against the [`Block`] model but never rebuilt from it, so fields
//! the model does not know about (emoji, spoilers, component ids) survive an
//! edit.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of buttons in one action row
pub const MAX_ROW_BUTTONS: usize = 5;

/// Zero-width text used as a spacer next to accessories
pub const ZERO_WIDTH_SPACE: &str = "\u{200b}";

const TYPE_ACTION_ROW: u8 = 1;
const TYPE_BUTTON: u8 = 2;
const TYPE_SECTION: u8 = 9;
pub(crate) const TYPE_TEXT_DISPLAY: u8 = 10;
const TYPE_THUMBNAIL: u8 = 11;
const TYPE_MEDIA_GALLERY: u8 = 12;
const TYPE_SEPARATOR: u8 = 14;
const TYPE_CONTAINER: u8 = 17;

/// Reference to an image by URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Absolute http(s) URL
    pub url: String,
}

/// One entry of a media gallery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// The image
    pub media: MediaRef,
    /// Alt text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MediaItem {
    /// Gallery item for a URL without alt text
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            media: MediaRef { url: url.into() },
            description: None,
        }
    }
}

/// Button styles understood by Discord
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    /// Blurple
    Primary,
    /// Grey
    Secondary,
    /// Green
    Success,
    /// Red
    Danger,
    /// Opens a URL
    Link,
}

impl ButtonStyle {
    fn code(self) -> u8 {
        match self {
            Self::Primary => 1,
            Self::Secondary => 2,
            Self::Success => 3,
            Self::Danger => 4,
            Self::Link => 5,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Primary),
            2 => Ok(Self::Secondary),
            3 => Ok(Self::Success),
            4 => Ok(Self::Danger),
            5 => Ok(Self::Link),
            other => Err(Error::InvalidBlock(format!("unknown button style {}", other))),
        }
    }
}

/// What a button does when pressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Opens the URL (link style)
    Url(String),
    /// Sends an interaction carrying this custom id
    Custom(String),
}

/// A clickable button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Visual style
    pub style: ButtonStyle,
    /// Text on the button
    pub label: String,
    /// Target of the button
    pub action: ButtonAction,
}

impl Button {
    /// Link button opening `url`
    pub fn link(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            style: ButtonStyle::Link,
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    /// Primary button emitting an interaction with `custom_id`
    pub fn action(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            style: ButtonStyle::Primary,
            label: label.into(),
            action: ButtonAction::Custom(custom_id.into()),
        }
    }
}

/// A node of the card tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub enum Block {
    /// Markdown text
    Text {
        /// Visible content, possibly carrying an invisible token
        content: String,
    },
    /// Grouping box with an optional accent stripe
    Container {
        /// 0xRRGGBB accent
        accent_color: Option<u32>,
        /// Nested blocks
        children: Vec<Block>,
    },
    /// One or more images
    MediaGallery {
        /// Gallery entries
        items: Vec<MediaItem>,
    },
    /// Horizontal spacing, optionally drawn as a line
    Separator {
        /// Whether a visible line is drawn
        divider: bool,
        /// Spacing size (1 small, 2 large)
        spacing: Option<u8>,
    },
    /// Row of up to five buttons
    ActionRow {
        /// Buttons, left to right
        buttons: Vec<Button>,
    },
    /// A standalone button (only valid as a section accessory)
    Button(Button),
    /// Text blocks with an accessory on the right
    Section {
        /// Text blocks
        children: Vec<Block>,
        /// Thumbnail or button
        accessory: Box<Block>,
    },
    /// Small image (only valid as a section accessory)
    Thumbnail {
        /// The image
        media: MediaRef,
        /// Alt text
        description: Option<String>,
    },
}

impl Block {
    /// Text block
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Empty container
    #[must_use]
    pub fn container(accent_color: Option<u32>) -> Self {
        Self::Container {
            accent_color,
            children: Vec::new(),
        }
    }

    /// Full-width banner image
    pub fn banner(url: impl Into<String>) -> Self {
        Self::MediaGallery {
            items: vec![MediaItem::new(url)],
        }
    }

    /// Section showing only a thumbnail, next to a zero-width spacer
    pub fn thumbnail(url: impl Into<String>) -> Self {
        Self::Section {
            children: vec![Self::text(ZERO_WIDTH_SPACE)],
            accessory: Box::new(Self::Thumbnail {
                media: MediaRef { url: url.into() },
                description: None,
            }),
        }
    }

    /// Visible divider line
    #[must_use]
    pub fn divider() -> Self {
        Self::Separator {
            divider: true,
            spacing: None,
        }
    }

    /// Action row holding a single button
    #[must_use]
    pub fn row(button: Button) -> Self {
        Self::ActionRow {
            buttons: vec![button],
        }
    }

    /// Integer type code used on the wire
    #[must_use]
    pub fn type_code(&self) -> u8 {
        match self {
            Self::Text { .. } => TYPE_TEXT_DISPLAY,
            Self::Container { .. } => TYPE_CONTAINER,
            Self::MediaGallery { .. } => TYPE_MEDIA_GALLERY,
            Self::Separator { .. } => TYPE_SEPARATOR,
            Self::ActionRow { .. } => TYPE_ACTION_ROW,
            Self::Button(_) => TYPE_BUTTON,
            Self::Section { .. } => TYPE_SECTION,
            Self::Thumbnail { .. } => TYPE_THUMBNAIL,
        }
    }

    /// Check the structural rules of this block and everything below it
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Container { children, .. } => validate_tree(children),
            Self::Section {
                children,
                accessory,
            } => {
                validate_tree(children)?;
                match accessory.as_ref() {
                    Self::Thumbnail { .. } | Self::Button(_) => Ok(()),
                    other => Err(Error::InvalidBlock(format!(
                        "section accessory must be a thumbnail or button, got type {}",
                        other.type_code()
                    ))),
                }
            }
            Self::ActionRow { buttons } => {
                if buttons.is_empty() || buttons.len() > MAX_ROW_BUTTONS {
                    return Err(Error::InvalidBlock(format!(
                        "action row must hold 1..={} buttons, got {}",
                        MAX_ROW_BUTTONS,
                        buttons.len()
                    )));
                }
                Ok(())
            }
            Self::Text { .. }
            | Self::MediaGallery { .. }
            | Self::Separator { .. }
            | Self::Button(_)
            | Self::Thumbnail { .. } => Ok(()),
        }
    }
}

/// Validate every block of a tree
pub fn validate_tree(blocks: &[Block]) -> Result<()> {
    blocks.iter().try_for_each(Block::validate)
}

/// A published card exactly as Discord returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct Card {
    components: Vec<Value>,
}

impl Card {
    /// Accept a fetched component list once it decodes as a valid block tree
    pub fn from_components(components: Vec<Value>) -> Result<Self> {
        let blocks = decode_blocks(&components)?;
        validate_tree(&blocks)?;
        Ok(Self { components })
    }

    /// Card holding freshly built blocks
    pub fn from_blocks(blocks: &[Block]) -> Result<Self> {
        let components = blocks
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }

    /// Raw top-level components
    #[must_use]
    pub fn components(&self) -> &[Value] {
        &self.components
    }

    pub(crate) fn components_mut(&mut self) -> &mut [Value] {
        &mut self.components
    }

    /// Typed view of the card. Fields outside the model are not included.
    pub fn blocks(&self) -> Result<Vec<Block>> {
        decode_blocks(&self.components)
    }
}

fn decode_blocks(components: &[Value]) -> Result<Vec<Block>> {
    components
        .iter()
        .map(|value| {
            let raw: RawBlock = serde_json::from_value(value.clone())?;
            Block::try_from(raw)
        })
        .collect()
}

impl TryFrom<Vec<Value>> for Card {
    type Error = Error;

    fn try_from(components: Vec<Value>) -> Result<Self> {
        Self::from_components(components)
    }
}

impl From<Card> for Vec<Value> {
    fn from(card: Card) -> Self {
        card.components
    }
}

/// Wire representation of a block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawBlock {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accent_color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    components: Option<Vec<RawBlock>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accessory: Option<Box<RawBlock>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    items: Option<Vec<MediaItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media: Option<MediaRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    divider: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spacing: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_id: Option<String>,
}

fn missing(kind: &str, field: &str) -> Error {
    Error::InvalidBlock(format!("{} is missing '{}'", kind, field))
}

fn convert_children(raw: Option<Vec<RawBlock>>) -> Result<Vec<Block>> {
    raw.unwrap_or_default()
        .into_iter()
        .map(Block::try_from)
        .collect()
}

fn button_from_raw(raw: RawBlock) -> Result<Button> {
    let style = ButtonStyle::from_code(raw.style.unwrap_or(1))?;
    let action = match (style, raw.url, raw.custom_id) {
        (ButtonStyle::Link, Some(url), _) => ButtonAction::Url(url),
        (ButtonStyle::Link, None, _) => return Err(missing("link button", "url")),
        (_, _, Some(custom_id)) => ButtonAction::Custom(custom_id),
        (_, _, None) => return Err(missing("button", "custom_id")),
    };
    Ok(Button {
        style,
        label: raw.label.unwrap_or_default(),
        action,
    })
}

fn button_to_raw(button: Button) -> RawBlock {
    let (url, custom_id) = match button.action {
        ButtonAction::Url(url) => (Some(url), None),
        ButtonAction::Custom(id) => (None, Some(id)),
    };
    RawBlock {
        kind: TYPE_BUTTON,
        style: Some(button.style.code()),
        label: Some(button.label),
        url,
        custom_id,
        ..RawBlock::default()
    }
}

impl TryFrom<RawBlock> for Block {
    type Error = Error;

    fn try_from(raw: RawBlock) -> Result<Self> {
        match raw.kind {
            TYPE_TEXT_DISPLAY => Ok(Self::Text {
                content: raw.content.ok_or_else(|| missing("text display", "content"))?,
            }),
            TYPE_CONTAINER => Ok(Self::Container {
                accent_color: raw.accent_color,
                children: convert_children(raw.components)?,
            }),
            TYPE_MEDIA_GALLERY => Ok(Self::MediaGallery {
                items: raw.items.unwrap_or_default(),
            }),
            TYPE_SEPARATOR => Ok(Self::Separator {
                divider: raw.divider.unwrap_or(true),
                spacing: raw.spacing,
            }),
            TYPE_ACTION_ROW => {
                let buttons = raw
                    .components
                    .unwrap_or_default()
                    .into_iter()
                    .map(|child| match child.kind {
                        TYPE_BUTTON => button_from_raw(child),
                        other => Err(Error::InvalidBlock(format!(
                            "action row may only hold buttons, got type {}",
                            other
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::ActionRow { buttons })
            }
            TYPE_BUTTON => Ok(Self::Button(button_from_raw(raw)?)),
            TYPE_SECTION => {
                let accessory = raw.accessory.ok_or_else(|| missing("section", "accessory"))?;
                Ok(Self::Section {
                    children: convert_children(raw.components)?,
                    accessory: Box::new(Block::try_from(*accessory)?),
                })
            }
            TYPE_THUMBNAIL => Ok(Self::Thumbnail {
                media: raw.media.ok_or_else(|| missing("thumbnail", "media"))?,
                description: raw.description,
            }),
            other => Err(Error::UnknownBlockType(other)),
        }
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        let kind = block.type_code();
        match block {
            Block::Text { content } => RawBlock {
                kind,
                content: Some(content),
                ..RawBlock::default()
            },
            Block::Container {
                accent_color,
                children,
            } => RawBlock {
                kind,
                accent_color,
                components: Some(children.into_iter().map(RawBlock::from).collect()),
                ..RawBlock::default()
            },
            Block::MediaGallery { items } => RawBlock {
                kind,
                items: Some(items),
                ..RawBlock::default()
            },
            Block::Separator { divider, spacing } => RawBlock {
                kind,
                divider: Some(divider),
                spacing,
                ..RawBlock::default()
            },
            Block::ActionRow { buttons } => RawBlock {
                kind,
                components: Some(buttons.into_iter().map(button_to_raw).collect()),
                ..RawBlock::default()
            },
            Block::Button(button) => button_to_raw(button),
            Block::Section {
                children,
                accessory,
            } => RawBlock {
                kind,
                components: Some(children.into_iter().map(RawBlock::from).collect()),
                accessory: Some(Box::new(RawBlock::from(*accessory))),
                ..RawBlock::default()
            },
            Block::Thumbnail { media, description } => RawBlock {
                kind,
                media: Some(media),
                description,
                ..RawBlock::default()
            },
        }
    }
}
