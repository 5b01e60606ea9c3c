// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in scenes bundled with the daemon.

use std::time::Duration;

use serde_json::{json, Value};

use crate::device::frame::{Frame, Rgb};
use crate::state::epoch_ms;

use super::registry::SceneFactory;
use super::{Scene, SceneContext, SceneDescriptor};

/// All built-in scene registrations.
pub fn all() -> Vec<(SceneDescriptor, SceneFactory)> {
    vec![
        (
            SceneDescriptor::new("empty", false).with_tags(&["utility"]).with_sort_order(-10),
            || Box::<EmptyScene>::default(),
        ),
        (
            SceneDescriptor::new("fill", false)
                .with_tags(&["utility"])
                .with_config_schema(json!({
                    "type": "object",
                    "properties": { "color": { "type": ["string", "array"] } }
                })),
            || Box::<FillScene>::default(),
        ),
        (
            SceneDescriptor::new("clock", true).with_tags(&["info"]),
            || Box::<ClockScene>::default(),
        ),
        (
            SceneDescriptor::new("performance-test", true)
                .with_tags(&["diagnostic"])
                .with_sort_order(100)
                .with_config_schema(json!({
                    "type": "object",
                    "properties": { "frametime": { "type": "integer", "minimum": 0 } }
                })),
            || Box::<PerformanceTestScene>::default(),
        ),
    ]
}

/// Parse a payload color: `"#RRGGBB"` or `[r, g, b]`.
pub fn parse_color(value: Option<&Value>) -> Option<Rgb> {
    match value? {
        Value::String(s) => {
            let hex = s.strip_prefix('#')?;
            if hex.len() != 6 {
                return None;
            }
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some([r, g, b])
        }
        Value::Array(arr) if arr.len() == 3 => {
            let mut rgb = [0u8; 3];
            for (i, v) in arr.iter().enumerate() {
                rgb[i] = v.as_u64().filter(|&n| n <= 255)? as u8;
            }
            Some(rgb)
        }
        _ => None,
    }
}

// -- empty --------------------------------------------------------------------

/// One-shot blank screen.
#[derive(Default)]
pub struct EmptyScene;

#[async_trait::async_trait]
impl Scene for EmptyScene {
    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        ctx.canvas.clear();
        Ok(None)
    }
}

// -- fill ---------------------------------------------------------------------

/// One-shot solid color, payload `{color}`.
#[derive(Default)]
pub struct FillScene;

#[async_trait::async_trait]
impl Scene for FillScene {
    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        let color = parse_color(ctx.payload.get("color")).unwrap_or([255, 255, 255]);
        ctx.canvas.fill(color);
        Ok(None)
    }
}

// -- clock --------------------------------------------------------------------

/// Looping HH:MM clock with a blinking colon, re-armed on second boundaries.
#[derive(Default)]
pub struct ClockScene;

#[async_trait::async_trait]
impl Scene for ClockScene {
    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        let now_ms = epoch_ms();
        let secs = now_ms / 1000;
        let hours = (secs / 3600) % 24;
        let minutes = (secs / 60) % 60;
        let blink = secs % 2 == 0;

        let canvas = &mut *ctx.canvas;
        canvas.clear();
        let scale = if canvas.height() >= 32 { 2 } else { 1 };
        let color: Rgb = parse_color(ctx.payload.get("color")).unwrap_or([255, 160, 0]);

        // HH:MM is four 3x5 digits plus the colon column, 17 cells wide.
        let total_w = 17 * scale;
        let x0 = (i32::from(canvas.width()) - total_w) / 2;
        let y0 = (i32::from(canvas.height()) - 5 * scale) / 2;

        draw_digit(canvas, x0, y0, (hours / 10) as usize, color, scale);
        draw_digit(canvas, x0 + 4 * scale, y0, (hours % 10) as usize, color, scale);
        if blink {
            canvas.fill_rect(x0 + 8 * scale, y0 + scale, scale as u16, scale as u16, color);
            canvas.fill_rect(x0 + 8 * scale, y0 + 3 * scale, scale as u16, scale as u16, color);
        }
        draw_digit(canvas, x0 + 10 * scale, y0, (minutes / 10) as usize, color, scale);
        draw_digit(canvas, x0 + 14 * scale, y0, (minutes % 10) as usize, color, scale);

        // Fire just past the next second boundary so the colon stays in step.
        Ok(Some(Duration::from_millis(1000 - (now_ms % 1000))))
    }
}

/// 3x5 digit glyphs, one row per byte, low three bits used.
const DIGIT_GLYPHS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

fn draw_digit(canvas: &mut Frame, x: i32, y: i32, digit: usize, color: Rgb, scale: i32) {
    let Some(glyph) = DIGIT_GLYPHS.get(digit) else { return };
    for (row, bits) in glyph.iter().enumerate() {
        for col in 0..3 {
            if bits & (0b100 >> col) != 0 {
                canvas.fill_rect(
                    x + col * scale,
                    y + row as i32 * scale,
                    scale as u16,
                    scale as u16,
                    color,
                );
            }
        }
    }
}

// -- performance-test ---------------------------------------------------------

/// Frame-rate exerciser: scrolling gradient plus pixel noise, cadence from
/// payload `{frametime}` (milliseconds; 0 = as fast as the loop allows).
#[derive(Default)]
pub struct PerformanceTestScene {
    frames: u64,
    started_ms: u64,
}

#[async_trait::async_trait]
impl Scene for PerformanceTestScene {
    async fn init(&mut self, _ctx: &mut SceneContext<'_>) -> anyhow::Result<()> {
        self.started_ms = epoch_ms();
        Ok(())
    }

    async fn render(&mut self, ctx: &mut SceneContext<'_>) -> anyhow::Result<Option<Duration>> {
        self.frames += 1;
        let canvas = &mut *ctx.canvas;
        let w = canvas.width();
        let h = canvas.height();
        let shift = (self.frames % u64::from(w.max(1))) as u16;

        for y in 0..h {
            for x in 0..w {
                let px = (x + shift) % w.max(1);
                let r = (px as u32 * 255 / u32::from(w.max(1))) as u8;
                let g = (y as u32 * 255 / u32::from(h.max(1))) as u8;
                canvas.set_pixel(i32::from(x), i32::from(y), [r, g, 64]);
            }
        }
        // A little noise so the wire never sees two identical frames.
        for _ in 0..8 {
            let x = i32::from(rand::random::<u16>() % w.max(1));
            let y = i32::from(rand::random::<u16>() % h.max(1));
            canvas.set_pixel(x, y, [255, 255, 255]);
        }

        if self.frames % 100 == 0 {
            let elapsed_ms = epoch_ms().saturating_sub(self.started_ms);
            ctx.publish_ok(json!({
                "scene": "performance-test",
                "frames": self.frames,
                "elapsedMs": elapsed_ms,
            }));
        }

        let frametime = ctx.payload_u64("frametime").unwrap_or(0);
        Ok(Some(Duration::from_millis(frametime)))
    }
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
