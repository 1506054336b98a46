use chip8::{DISPLAY_HEIGHT, DISPLAY_WIDTH, Framebuffer};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
};

const LIT: char = '█';
const UNLIT: char = ' ';

const KEY_MAPPING: &str = "Key Mapping:\n\
    1 2 3 4    →    1 2 3 C\n\
    Q W E R    →    4 5 6 D\n\
    A S D F    →    7 8 9 E\n\
    Z X C V    →    A 0 B F";

/// Renders the framebuffer, keypad legend and a one-line status.
pub fn draw(frame: &mut Frame, framebuffer: &Framebuffer, rom_name: &str, status: &str) {
    // 64x32 plus borders
    let game_width = (DISPLAY_WIDTH as u16) + 2;
    let game_height = (DISPLAY_HEIGHT as u16) + 2;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(game_height),
            Constraint::Length(7),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(frame.area());

    let game_paragraph = Paragraph::new(render_pixels(framebuffer))
        .block(Block::default().borders(Borders::ALL).title(rom_name))
        .style(Style::default().fg(Color::White));
    frame.render_widget(game_paragraph, centered(chunks[0], game_width));

    let key_paragraph = Paragraph::new(KEY_MAPPING)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Keypad"))
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(key_paragraph, chunks[1]);

    let status_paragraph = Paragraph::new(status)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status_paragraph, chunks[2]);
}

/// Centers a `width`-column slice of `area` when the terminal is wider.
fn centered(area: Rect, width: u16) -> Rect {
    if area.width <= width {
        return area;
    }
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .split(area)[1]
}

fn render_pixels(framebuffer: &Framebuffer) -> String {
    let mut rows = String::with_capacity((DISPLAY_WIDTH + 1) * DISPLAY_HEIGHT);
    for y in 0..DISPLAY_HEIGHT {
        for x in 0..DISPLAY_WIDTH {
            rows.push(if framebuffer.pixel(x, y) { LIT } else { UNLIT });
        }
        rows.push('\n');
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{Terminal, backend::TestBackend};

    #[test]
    fn test_render_pixels_is_one_line_per_row() {
        let mut framebuffer = Framebuffer::new();
        framebuffer.draw_sprite(0, 1, &[0b1010_0000]);
        let text = render_pixels(&framebuffer);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), DISPLAY_HEIGHT);
        assert!(lines.iter().all(|l| l.chars().count() == DISPLAY_WIDTH));
        assert!(lines[0].chars().all(|c| c == UNLIT));
        assert!(lines[1].starts_with("█ █ "));
    }

    #[test]
    fn test_draw_renders_lit_pixels() {
        let mut framebuffer = Framebuffer::new();
        framebuffer.draw_sprite(10, 5, &[0xF0]);

        let mut terminal = Terminal::new(TestBackend::new(80, 45)).unwrap();
        terminal
            .draw(|frame| draw(frame, &framebuffer, "test", "running"))
            .unwrap();

        let lit = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .filter(|cell| cell.symbol() == "█")
            .count();
        assert_eq!(lit, 4);
    }

    #[test]
    fn test_centered_keeps_narrow_area() {
        let area = Rect::new(0, 0, 40, 10);
        assert_eq!(centered(area, 66), area);
        assert_eq!(centered(Rect::new(0, 0, 100, 10), 66).width, 66);
    }
}
