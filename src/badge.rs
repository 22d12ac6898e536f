// Copyright 2025 Alejandro Martínez Corriá and the Thinkube contributors
// SPDX-License-Identifier: Apache-2.0

//! SVG badge rendering.
//!
//! Text is measured with a fixed advance per character instead of real font
//! metrics, so the output depends only on the character counts of the label
//! and message. Each `<text>` element carries a `textLength` so that viewers
//! stretch the glyphs to exactly the measured width.

use std::borrow::Cow;
use std::fmt::Write;

const CHAR_WIDTH: usize = 7;
const HORIZONTAL_PADDING: usize = 10;
const BADGE_HEIGHT: usize = 20;
/// Text elements are drawn under `scale(.1)`.
const TEXT_SCALE: usize = 10;

const LABEL_FILL: &str = "#555";
const FONT_FAMILY: &str = "Verdana,Geneva,DejaVu Sans,sans-serif";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeKind {
    Version,
    Downloads,
}

impl BadgeKind {
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "version" => Some(BadgeKind::Version),
            "downloads" => Some(BadgeKind::Downloads),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeKind::Version => "version",
            BadgeKind::Downloads => "downloads",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BadgeStyle {
    Plastic,
    #[default]
    Flat,
    FlatSquare,
    ForTheBadge,
    Social,
}

impl BadgeStyle {
    /// Unknown or missing styles silently become `Flat`.
    pub fn parse_or_default(input: Option<&str>) -> Self {
        match input {
            Some("plastic") => BadgeStyle::Plastic,
            Some("flat-square") => BadgeStyle::FlatSquare,
            Some("for-the-badge") => BadgeStyle::ForTheBadge,
            Some("social") => BadgeStyle::Social,
            _ => BadgeStyle::Flat,
        }
    }

    fn appearance(&self) -> Appearance {
        match self {
            BadgeStyle::Flat => Appearance {
                radius: 3,
                gradient: Some(FLAT_GRADIENT),
                label_fill: LABEL_FILL,
                label_text_fill: "#fff",
                label_shadow_fill: "#010101",
                uppercase: false,
            },
            BadgeStyle::Plastic => Appearance {
                radius: 4,
                gradient: Some(PLASTIC_GRADIENT),
                ..BadgeStyle::Flat.appearance()
            },
            BadgeStyle::FlatSquare => Appearance {
                radius: 0,
                gradient: None,
                ..BadgeStyle::Flat.appearance()
            },
            BadgeStyle::ForTheBadge => Appearance {
                radius: 0,
                gradient: None,
                uppercase: true,
                ..BadgeStyle::Flat.appearance()
            },
            BadgeStyle::Social => Appearance {
                label_fill: "#fcfcfc",
                label_text_fill: "#333",
                label_shadow_fill: "#fff",
                ..BadgeStyle::Flat.appearance()
            },
        }
    }
}

const FLAT_GRADIENT: &str = r##"<stop offset="0" stop-color="#bbb" stop-opacity=".1"/><stop offset="1" stop-opacity=".1"/>"##;
const PLASTIC_GRADIENT: &str = r##"<stop offset="0" stop-color="#fff" stop-opacity=".7"/><stop offset=".1" stop-color="#aaa" stop-opacity=".1"/><stop offset=".9" stop-opacity=".3"/><stop offset="1" stop-opacity=".5"/>"##;

struct Appearance {
    radius: u8,
    gradient: Option<&'static str>,
    label_fill: &'static str,
    label_text_fill: &'static str,
    label_shadow_fill: &'static str,
    uppercase: bool,
}

/// Fill color of the message box, always a hex code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeColor(Cow<'static, str>);

impl BadgeColor {
    pub const BRIGHT_GREEN: BadgeColor = BadgeColor(Cow::Borrowed("#4c1"));
    pub const RED: BadgeColor = BadgeColor(Cow::Borrowed("#e05d44"));

    /// Accepts a named color or a 3/6 digit hex code with or without `#`.
    pub fn parse(input: &str) -> Option<Self> {
        let named = match input.to_ascii_lowercase().as_str() {
            "brightgreen" | "success" => Some("#4c1"),
            "green" => Some("#97ca00"),
            "yellowgreen" => Some("#a4a61d"),
            "yellow" => Some("#dfb317"),
            "orange" | "important" => Some("#fe7d37"),
            "red" | "critical" => Some("#e05d44"),
            "blue" | "informational" => Some("#007ec6"),
            "grey" | "gray" => Some("#555"),
            "lightgrey" | "lightgray" | "inactive" => Some("#9f9f9f"),
            _ => None,
        };
        if let Some(hex) = named {
            return Some(BadgeColor(Cow::Borrowed(hex)));
        }

        let hex = input.strip_prefix('#').unwrap_or(input);
        if matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(BadgeColor(Cow::Owned(format!("#{}", hex.to_ascii_lowercase()))));
        }

        None
    }

    pub fn parse_or_default(input: Option<&str>) -> Self {
        input.and_then(Self::parse).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BadgeColor {
    fn default() -> Self {
        BadgeColor::BRIGHT_GREEN
    }
}

/// Widths and anchors for a label/message pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeLayout {
    pub label_text_width: usize,
    pub message_text_width: usize,
    pub label_box_width: usize,
    pub message_box_width: usize,
    pub total_width: usize,
    /// Horizontal center of the label text, in scaled text coordinates.
    pub label_center: usize,
    /// Horizontal center of the message text, in scaled text coordinates.
    pub message_center: usize,
}

impl BadgeLayout {
    pub fn measure(label: &str, message: &str) -> Self {
        let label_text_width = label.chars().count() * CHAR_WIDTH;
        let message_text_width = message.chars().count() * CHAR_WIDTH;
        let label_box_width = label_text_width + HORIZONTAL_PADDING;
        let message_box_width = message_text_width + HORIZONTAL_PADDING;

        Self {
            label_text_width,
            message_text_width,
            label_box_width,
            message_box_width,
            total_width: label_box_width + message_box_width,
            label_center: label_box_width * TEXT_SCALE / 2,
            message_center: label_box_width * TEXT_SCALE + message_box_width * TEXT_SCALE / 2,
        }
    }
}

/// Renders a two-box badge as a standalone SVG document.
pub fn render_badge(label: &str, message: &str, color: &BadgeColor, style: BadgeStyle) -> String {
    let look = style.appearance();
    let (label, message) = if look.uppercase {
        (Cow::Owned(label.to_uppercase()), Cow::Owned(message.to_uppercase()))
    } else {
        (Cow::Borrowed(label), Cow::Borrowed(message))
    };

    let layout = BadgeLayout::measure(&label, &message);
    let width = layout.total_width;
    let label_length = layout.label_text_width * TEXT_SCALE;
    let message_length = layout.message_text_width * TEXT_SCALE;
    let title = format!("{label}: {message}");
    let title = escape_xml(&title);
    let label = escape_xml(&label);
    let message = escape_xml(&message);

    let mut svg = String::with_capacity(1024);
    // Writing into a String cannot fail.
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{BADGE_HEIGHT}" role="img" aria-label="{title}"><title>{title}</title>"#
    );
    if let Some(stops) = look.gradient {
        let _ = write!(svg, r#"<linearGradient id="s" x2="0" y2="100%">{stops}</linearGradient>"#);
    }
    let _ = write!(
        svg,
        r##"<clipPath id="r"><rect width="{width}" height="{BADGE_HEIGHT}" rx="{}" fill="#fff"/></clipPath>"##,
        look.radius
    );
    let _ = write!(
        svg,
        r#"<g clip-path="url(#r)"><rect width="{}" height="{BADGE_HEIGHT}" fill="{}"/><rect x="{}" width="{}" height="{BADGE_HEIGHT}" fill="{}"/>"#,
        layout.label_box_width,
        look.label_fill,
        layout.label_box_width,
        layout.message_box_width,
        color.as_str()
    );
    if look.gradient.is_some() {
        let _ = write!(svg, r#"<rect width="{width}" height="{BADGE_HEIGHT}" fill="url(#s)"/>"#);
    }
    svg.push_str("</g>");
    let _ = write!(
        svg,
        r##"<g fill="#fff" text-anchor="middle" font-family="{FONT_FAMILY}" text-rendering="geometricPrecision" font-size="110">"##
    );
    let _ = write!(
        svg,
        r#"<text aria-hidden="true" x="{x}" y="150" fill="{}" fill-opacity=".3" transform="scale(.1)" textLength="{label_length}">{label}</text><text x="{x}" y="140" transform="scale(.1)" fill="{}" textLength="{label_length}">{label}</text>"#,
        look.label_shadow_fill,
        look.label_text_fill,
        x = layout.label_center,
    );
    let _ = write!(
        svg,
        r##"<text aria-hidden="true" x="{x}" y="150" fill="#010101" fill-opacity=".3" transform="scale(.1)" textLength="{message_length}">{message}</text><text x="{x}" y="140" transform="scale(.1)" fill="#fff" textLength="{message_length}">{message}</text>"##,
        x = layout.message_center,
    );
    svg.push_str("</g></svg>");

    svg
}

fn escape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
