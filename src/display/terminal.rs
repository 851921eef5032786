// SPDX-License-Identifier: GPL-3.0-only

//! Terminal window sink
//!
//! Renders composed frames to the terminal using Unicode half-block
//! characters (two vertical pixels per cell) with a status line at the
//! bottom. Keys are read through crossterm; a hang-up flag set by the
//! signal handler reports the window as closed.

use super::{Key, RenderSink, WindowState};
use crate::errors::{AppError, AppResult, ControlError};
use crate::pipeline::session::ConfidenceControl;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, SetTitle, disable_raw_mode, enable_raw_mode,
    },
};
use image::RgbImage;
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    style::Style, widgets::Widget,
};
use std::io::{Stdout, stdout};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub struct TerminalSink {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    frame_widget: FrameWidget,
    control: ConfidenceControl,
    hangup: Arc<AtomicBool>,
}

impl TerminalSink {
    pub fn new(initial_confidence: i32, hangup: Arc<AtomicBool>) -> Self {
        Self {
            terminal: None,
            frame_widget: FrameWidget::new(),
            control: ConfidenceControl::new(initial_confidence),
            hangup,
        }
    }
}

impl RenderSink for TerminalSink {
    fn create_window(&mut self, name: &str, width: u32, height: u32) -> AppResult<()> {
        if self.terminal.is_some() {
            return Ok(());
        }

        enable_raw_mode()?;
        let mut stdout = stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen, SetTitle(name)) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend).map_err(|e| AppError::Display(e.to_string()))?;
        self.terminal = Some(terminal);

        info!(window = name, width, height, "Terminal window created");
        Ok(())
    }

    fn show(&mut self, _name: &str, image: &RgbImage, status: &str) -> AppResult<()> {
        self.frame_widget.update_frame(image.clone());
        let Some(terminal) = self.terminal.as_mut() else {
            return Err(AppError::Display("window not created".to_string()));
        };

        let frame_widget = &self.frame_widget;
        let message = format!("{} | conf {}%", status, self.control.value());
        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };
            f.render_widget(frame_widget, camera_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(StatusBar { message: &message }, status_area);
        })?;
        Ok(())
    }

    fn window_state(&self, _name: &str) -> WindowState {
        if self.terminal.is_none() || self.hangup.load(Ordering::SeqCst) {
            WindowState::Closed
        } else {
            WindowState::Open
        }
    }

    fn poll_key(&mut self, timeout: Duration) -> AppResult<Option<Key>> {
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                return Ok(Some(Key::Interrupt));
            }
            return Ok(match key.code {
                KeyCode::Char(c) => Some(Key::Char(c)),
                KeyCode::Esc => Some(Key::Escape),
                KeyCode::Up => Some(Key::Up),
                KeyCode::Down => Some(Key::Down),
                _ => None,
            });
        }
        Ok(None)
    }

    fn confidence_value(&self) -> Result<i32, ControlError> {
        if self.terminal.is_none() {
            return Err(ControlError::Unavailable);
        }
        Ok(self.control.value())
    }

    fn adjust_confidence(&mut self, delta: i32) -> Result<i32, ControlError> {
        Ok(self.control.adjust(delta))
    }

    fn restore(&mut self) -> AppResult<()> {
        let Some(mut terminal) = self.terminal.take() else {
            return Ok(());
        };
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "Failed to restore terminal");
        }
    }
}

/// Widget that renders a frame using half-block characters
struct FrameWidget {
    frame: Option<RgbImage>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, frame: RgbImage) {
        self.frame = Some(frame);
    }
}

/// Largest (columns, rows) with the frame's aspect ratio that fits `area`
fn fit_to_area(frame_width: u32, frame_height: u32, area: Rect) -> (u16, u16) {
    if frame_width == 0 || frame_height == 0 {
        return (0, 0);
    }
    let frame_aspect = frame_width as f64 / frame_height as f64;
    let term_width = area.width as f64;
    // *2 because half-blocks
    let term_height = (area.height as f64) * 2.0;

    if term_height == 0.0 {
        return (0, 0);
    }
    if term_width / term_height > frame_aspect {
        let w = term_height * frame_aspect;
        (w as u16, (term_height / 2.0) as u16)
    } else {
        let h = term_width / frame_aspect;
        (term_width as u16, (h / 2.0) as u16)
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = &self.frame else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };

        let (display_width, display_height) = fit_to_area(frame.width(), frame.height(), area);
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height as f64 * 2.0);
        let max_x = frame.width() - 1;
        let max_y = frame.height() - 1;

        // Upper half (▀) takes the fg colour, lower half the bg colour
        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;
                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = ((tx as f64 * x_scale) as u32).min(max_x);
                let src_y_top = ((ty as f64 * 2.0 * y_scale) as u32).min(max_y);
                let src_y_bottom = (((ty as f64 * 2.0 + 1.0) * y_scale) as u32).min(max_y);

                let [tr, tg, tb] = frame.get_pixel(src_x, src_y_top).0;
                let [br, bg, bb] = frame.get_pixel(src_x, src_y_bottom).0;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(Color::Rgb(tr, tg, tb));
                    cell.set_bg(Color::Rgb(br, bg, bb));
                }
            }
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}
