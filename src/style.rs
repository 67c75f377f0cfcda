use crate::types::{Color, Pt};

/// Face selector within a family. Maps onto the style argument of the
/// surface's font table ("normal"/"bold"/"italic"/"bolditalic").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontVariant {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontVariant {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontVariant::Regular,
            (true, false) => FontVariant::Bold,
            (false, true) => FontVariant::Italic,
            (true, true) => FontVariant::BoldItalic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FontVariant::Regular => "normal",
            FontVariant::Bold => "bold",
            FontVariant::Italic => "italic",
            FontVariant::BoldItalic => "bolditalic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Middle,
    Bottom,
}

/// Full style of one table cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellStyle {
    /// `None` inherits the engine's document family.
    pub font_family: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub font_size: Pt,
    pub color: Color,
    pub fill: Option<Color>,
    pub halign: HAlign,
    pub valign: VAlign,
    pub padding: Pt,
    pub border_width: Pt,
    pub border_color: Color,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            font_family: None,
            bold: false,
            italic: false,
            underline: false,
            strike: false,
            font_size: Pt::from_f32(10.0),
            color: Color::BLACK,
            fill: None,
            halign: HAlign::Left,
            valign: VAlign::Top,
            padding: Pt::from_f32(2.0),
            border_width: Pt::from_f32(0.2),
            border_color: Color::BLACK,
        }
    }
}

impl CellStyle {
    /// Default presentation for header cells: bold, centered, light fill.
    pub fn header() -> Self {
        Self {
            bold: true,
            halign: HAlign::Center,
            valign: VAlign::Middle,
            fill: Some(Color::rgb(0.93, 0.93, 0.93)),
            ..Self::default()
        }
    }

    pub fn variant(&self) -> FontVariant {
        FontVariant::from_flags(self.bold, self.italic)
    }
}

/// Resolved inline style of one styled run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStyle {
    pub font_family: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub color: Color,
    pub font_size: Pt,
}

impl Default for RunStyle {
    fn default() -> Self {
        Self {
            font_family: None,
            bold: false,
            italic: false,
            underline: false,
            strike: false,
            color: Color::BLACK,
            font_size: Pt::from_f32(10.0),
        }
    }
}

impl RunStyle {
    pub fn variant(&self) -> FontVariant {
        FontVariant::from_flags(self.bold, self.italic)
    }
}

/// Inline style modifier carried by a styled content node. Folded over the
/// inherited style by [`apply_modifiers`]; there is deliberately no
/// string-keyed tag dispatch anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StyleModifier {
    Bold,
    Italic,
    Underline,
    Strike,
    Color(Color),
    FontSize(Pt),
}

pub fn apply_modifiers(base: &RunStyle, modifiers: &[StyleModifier]) -> RunStyle {
    modifiers
        .iter()
        .fold(base.clone(), |mut style, modifier| {
            match modifier {
                StyleModifier::Bold => style.bold = true,
                StyleModifier::Italic => style.italic = true,
                StyleModifier::Underline => style.underline = true,
                StyleModifier::Strike => style.strike = true,
                StyleModifier::Color(color) => style.color = *color,
                StyleModifier::FontSize(size) => style.font_size = *size,
            }
            style
        })
}
