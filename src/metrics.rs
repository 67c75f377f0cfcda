use crate::error::GalleyError;
use crate::types::Pt;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};

/// Position/thickness of a decoration line in 1000-per-em units.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecorationMetrics {
    pub(crate) position: i16,
    pub(crate) thickness: i16,
}

impl DecorationMetrics {
    pub(crate) fn offset_for(self, font_size: Pt) -> Pt {
        font_size.mul_ratio(self.position as i32, 1000)
    }

    pub(crate) fn thickness_for(self, font_size: Pt) -> Pt {
        font_size.mul_ratio(self.thickness as i32, 1000)
    }
}

/// Parsed metrics for one font face: an ASCII advance table for the fast
/// path and the raw program bytes for shaped full-Unicode measurement.
#[derive(Debug)]
pub(crate) struct GlyphMetrics {
    data: Vec<u8>,
    first_char: u8,
    last_char: u8,
    widths: Vec<u16>,
    ascent: i16,
    descent: i16,
    line_gap: i16,
    missing_width: u16,
    underline: Option<DecorationMetrics>,
    strikeout: Option<DecorationMetrics>,
}

impl GlyphMetrics {
    pub(crate) fn parse(data: Vec<u8>) -> Result<Self, GalleyError> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|_| GalleyError::Asset("invalid font data".to_string()))?;
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;

        let mut widths = Vec::with_capacity((last_char - first_char + 1) as usize);
        for code in first_char..=last_char {
            let width = char::from_u32(code as u32)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(0);
            let scaled = (width as f32 * scale).round() as i32;
            widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
        }
        let missing_width = widths
            .get((b' ' - first_char) as usize)
            .copied()
            .unwrap_or(0);

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let line_gap = scale_i16(face.line_gap(), scale);
        let underline = face.underline_metrics().map(|metrics| DecorationMetrics {
            position: scale_i16(metrics.position, scale),
            thickness: scale_i16(metrics.thickness, scale),
        });
        let strikeout = face.strikeout_metrics().map(|metrics| DecorationMetrics {
            position: scale_i16(metrics.position, scale),
            thickness: scale_i16(metrics.thickness, scale),
        });

        Ok(Self {
            data,
            first_char,
            last_char,
            widths,
            ascent,
            descent,
            line_gap,
            missing_width,
            underline,
            strikeout,
        })
    }

    pub(crate) fn measure(&self, font_size: Pt, text: &str) -> Pt {
        if self.is_within_basic_latin(text) {
            return self.measure_from_table(font_size, text);
        }
        self.measure_shaped(font_size, text)
            .unwrap_or_else(|| self.measure_from_table(font_size, text))
    }

    pub(crate) fn line_height(&self, font_size: Pt) -> Pt {
        let height_1000 = self.ascent as i32 - self.descent as i32 + self.line_gap as i32;
        if height_1000 <= 0 {
            return font_size.mul_ratio(6, 5);
        }
        font_size.mul_ratio(height_1000, 1000)
    }

    pub(crate) fn ascent(&self, font_size: Pt) -> Pt {
        font_size.mul_ratio(self.ascent as i32, 1000)
    }

    pub(crate) fn underline_metrics(&self) -> Option<DecorationMetrics> {
        self.underline
    }

    pub(crate) fn strikeout_metrics(&self) -> Option<DecorationMetrics> {
        self.strikeout
    }

    fn is_within_basic_latin(&self, text: &str) -> bool {
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        text.chars().all(|ch| {
            let code = ch as u32;
            code >= first && code <= last
        })
    }

    fn measure_from_table(&self, font_size: Pt, text: &str) -> Pt {
        let mut total_units: i32 = 0;
        for ch in text.chars() {
            total_units = total_units.saturating_add(self.advance_for_char(ch) as i32);
        }
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        if code < first || code > last {
            return self.missing_width;
        }
        let idx = (code - first) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }

    fn measure_shaped(&self, font_size: Pt, text: &str) -> Option<Pt> {
        let face = HbFace::from_slice(&self.data, 0)?;
        let units_per_em = face.units_per_em().max(1) as i64;

        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let positions = output.glyph_positions();
        if positions.is_empty() {
            return None;
        }
        let mut total_units: i32 = 0;
        for pos in positions {
            let adv = (((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em) as i32;
            total_units = total_units.saturating_add(adv);
        }
        if total_units <= 0 {
            return Some(Pt::ZERO);
        }
        Some(font_size.mul_ratio(total_units, 1000))
    }
}

fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
