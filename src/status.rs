//! Text screens shown at startup and after a mode change.

use std::fs;
use std::net::IpAddr;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use config_model::{ConfigSnapshot, ModeId};
use fontdb::{Database, Family, Query, Source};
use if_addrs::get_if_addrs;
use tracing::{debug, warn};

use crate::frame::Frame;

const FONT_SIZE: f32 = 24.0;
const LINE_PITCH: f32 = 30.0;
const LEFT_MARGIN: f32 = 10.0;
const UNKNOWN_ADDRESS: &str = "undefined";

pub struct StatusRenderer {
    font: Option<FontArc>,
    interface: String,
}

impl StatusRenderer {
    /// Load a system font; without one, status screens render blank.
    pub fn new(interface: impl Into<String>) -> Self {
        let font = match load_font() {
            Ok(font) => Some(font),
            Err(err) => {
                warn!(error = ?err, "no usable font; status screens will be blank");
                None
            }
        };
        Self::with_font(font, interface)
    }

    pub fn with_font(font: Option<FontArc>, interface: impl Into<String>) -> Self {
        Self {
            font,
            interface: interface.into(),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Address of the configured interface, or `undefined`.
    pub fn ip_address(&self) -> String {
        interface_address(&self.interface)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
    }

    /// "Loading", the address, then every configuration entry.
    pub fn startup_info(&self, config: &ConfigSnapshot) -> Frame {
        let mut lines = vec!["Loading".to_string(), format!("ip: {}", self.ip_address())];
        lines.extend(
            config
                .entries()
                .iter()
                .map(|(key, value)| format!("{key}: {value}")),
        );
        self.render_lines(&lines)
    }

    pub fn mode_banner(&self, mode: ModeId) -> Frame {
        self.render_lines(&[format!("mode {}", mode.index()), self.ip_address()])
    }

    pub fn render_lines(&self, lines: &[String]) -> Frame {
        let mut frame = Frame::blank();
        let Some(font) = &self.font else {
            return frame;
        };
        let scale = PxScale::from(FONT_SIZE);
        let ascent = font.as_scaled(scale).ascent();
        for (row, line) in lines.iter().enumerate() {
            let top = row as f32 * LINE_PITCH;
            if top >= Frame::HEIGHT as f32 {
                debug!(skipped = lines.len() - row, "status text overflows frame");
                break;
            }
            draw_text(&mut frame, font, line, LEFT_MARGIN, top + ascent, scale);
        }
        frame
    }
}

fn interface_address(name: &str) -> Option<IpAddr> {
    let ifaces = match get_if_addrs() {
        Ok(ifaces) => ifaces,
        Err(err) => {
            warn!("failed to enumerate interfaces: {err:?}");
            return None;
        }
    };
    let mut addrs: Vec<IpAddr> = ifaces
        .into_iter()
        .filter(|iface| iface.name == name)
        .map(|iface| iface.ip())
        .collect();
    addrs.sort_by_key(|ip| !ip.is_ipv4());
    addrs.into_iter().next()
}

fn draw_text(frame: &mut Frame, font: &FontArc, text: &str, left: f32, baseline: f32, scale: PxScale) {
    let scaled = font.as_scaled(scale);
    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph);
        }
        let advance = scaled.h_advance(glyph);
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                let px = bounds.min.x + x as f32;
                let py = bounds.min.y + y as f32;
                if coverage >= 0.5 && px >= 0.0 && py >= 0.0 {
                    frame.set_pixel(px as u32, py as u32, false);
                }
            });
        }
        cursor_x += advance;
        previous = Some(glyph);
    }
}

fn load_font() -> Result<FontArc> {
    let mut db = Database::new();
    db.load_system_fonts();

    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Noto Sans"),
        Family::Name("Liberation Sans"),
        Family::SansSerif,
    ];

    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)?
        {
            return Ok(font);
        }
    }

    for face in db.faces() {
        if let Some(font) = load_face(&db, face.id)? {
            return Ok(font);
        }
    }

    Err(anyhow!("failed to load a system font for status screens"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<Option<FontArc>> {
    let face = db.face(id).context("missing font face in database")?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => {
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?
        }
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    let font = FontArc::try_from_vec(data).context("failed to decode font face")?;
    Ok(Some(font))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_font_screens_are_blank() {
        let renderer = StatusRenderer::with_font(None, "lo");
        assert_eq!(renderer.mode_banner(ModeId::FixedCollection), Frame::blank());
        assert_eq!(
            renderer.startup_info(&ConfigSnapshot::default()),
            Frame::blank()
        );
    }

    #[test]
    fn unknown_interface_has_undefined_address() {
        let renderer = StatusRenderer::with_font(None, "no-such-iface0");
        assert_eq!(renderer.ip_address(), "undefined");
    }

    #[test]
    fn banner_draws_ink_when_a_font_is_available() {
        let renderer = StatusRenderer::new("lo");
        if !renderer.has_font() {
            // Build hosts without system fonts cannot exercise rasterisation.
            return;
        }
        let frame = renderer.mode_banner(ModeId::LocalCycle);
        assert!(frame.black_pixel_count() > 0);
        // Text stays inside the first two lines.
        for y in 70..Frame::HEIGHT {
            for x in 0..Frame::WIDTH {
                assert!(frame.is_white(x, y));
            }
        }
    }
}
