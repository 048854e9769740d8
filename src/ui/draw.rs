use anyhow::Result;
use ratatui::backend::Backend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::line::NORMAL as LINE;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use ratatui_image::{Resize, StatefulImage};

use crate::config::RgbColor;
use crate::detail::ContactDetail;
use crate::screen::{ListRow, NoticeKind};
use crate::source::ContactSource;

use super::app::App;

const SEARCH_LABEL: &str = "SEARCH: ";
const PANEL_MIN_WIDTH: u16 = 40;

pub fn render<B, S>(terminal: &mut Terminal<B>, app: &mut App<'_, S>) -> Result<()>
where
    B: Backend,
    S: ContactSource + 'static,
{
    terminal.draw(|frame| draw_frame(frame, app))?;
    Ok(())
}

fn draw_frame<S: ContactSource + 'static>(frame: &mut Frame<'_>, app: &mut App<'_, S>) {
    let size = frame.area();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);

    draw_header(frame, layout[0], app);
    draw_list(frame, layout[1], app);
    draw_footer(frame, layout[2], app);
    draw_detail_panel(frame, layout[1], app);
    draw_notice(frame, size, app);
}

fn draw_header<S: ContactSource + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, S>) {
    if area.width == 0 || area.height == 0 {
        return;
    }

    let value = app.search_input.value();
    let line = Line::from(vec![
        Span::styled(SEARCH_LABEL, header_text_style(app)),
        Span::raw(value.to_string()),
    ]);
    frame.render_widget(Paragraph::new(line), area);

    let typing = app.screen.notice().is_none() && !app.screen.detail().is_panel_visible();
    if typing {
        let column = Span::raw(SEARCH_LABEL).width() + app.search_input.visual_cursor();
        let x = area.x.saturating_add(column as u16).min(area.right().saturating_sub(1));
        frame.set_cursor_position((x, area.y));
    }
}

fn draw_list<S: ContactSource + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, S>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let rows = app.screen.rows();
    if rows.is_empty() {
        let message = if app.screen.is_loading() {
            "LOADING CONTACTS"
        } else {
            "NO CONTACTS"
        };
        render_centered_words(frame, inner, message);
        return;
    }

    let items: Vec<ListItem> = rows.iter().map(|row| build_list_item(row, app)).collect();

    let mut state = ListState::default();
    state.select(app.screen.cursor_row());

    let list = List::new(items)
        .highlight_style(selection_style(app))
        .highlight_symbol(" ")
        .repeat_highlight_symbol(false);

    frame.render_stateful_widget(list, inner, &mut state);
}

fn build_list_item<S: ContactSource + 'static>(
    row: &ListRow<'_>,
    app: &App<'_, S>,
) -> ListItem<'static> {
    match row {
        ListRow::Header(title) => ListItem::new(Line::from(Span::styled(
            title.to_string(),
            header_text_style(app).add_modifier(Modifier::BOLD),
        ))),
        ListRow::Contact(contact) => ListItem::new(Line::from(format!("  {}", contact.name))),
    }
}

fn draw_footer<S: ContactSource + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, S>) {
    let status = if app.screen.is_loading() {
        "LOADING...".to_string()
    } else if app.screen.detail().is_loading() {
        "OPENING...".to_string()
    } else {
        format!("{} CONTACTS", app.screen.contact_count())
    };
    let message = format!("{}  {}", status, app.keys_hint());

    let colors = app.ui_colors();
    let style = Style::default()
        .fg(color(colors.status_fg))
        .bg(color(colors.status_bg));

    let background = Block::default().style(Style::default().bg(color(colors.status_bg)));
    frame.render_widget(background, area);

    frame.render_widget(Paragraph::new(message).style(style), area);
}

fn draw_detail_panel<S: ContactSource + 'static>(
    frame: &mut Frame<'_>,
    area: Rect,
    app: &mut App<'_, S>,
) {
    if !app.screen.detail().is_panel_visible() {
        return;
    }
    let Some(detail) = app.screen.detail().detail().cloned() else {
        return;
    };

    let image_width = app.image_pane_width();
    let image_height = app.image_pane_height();
    let show_image = detail.image.is_some();

    let content_rows = (detail.phone_numbers.len().max(1) as u16).saturating_add(4);
    let wanted_height = if show_image {
        content_rows.max(image_height.saturating_add(4))
    } else {
        content_rows
    };
    let width = area
        .width
        .saturating_mul(2)
        .saturating_div(3)
        .max(PANEL_MIN_WIDTH)
        .min(area.width);
    let height = wanted_height.min(area.height);
    let modal_area = centered(area, width, height);

    frame.render_widget(Clear, modal_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(" CONTACT ", header_text_style(app)))
        .title_alignment(Alignment::Center);
    let inner = block.inner(modal_area);
    frame.render_widget(block, modal_area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(0)])
        .split(inner);

    render_header_with_separator(
        frame,
        layout[0],
        Line::from(Span::styled(
            detail.name.clone(),
            header_text_style(app).add_modifier(Modifier::BOLD),
        )),
        app,
        modal_area.width,
    );

    let (phones_area, image_area) = if show_image {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(image_width)])
            .split(layout[1]);
        (columns[0], Some(columns[1]))
    } else {
        (layout[1], None)
    };

    frame.render_widget(Paragraph::new(phone_lines(&detail, app)), phones_area);

    if let Some(image_area) = image_area {
        draw_image(frame, image_area, app);
    }
}

fn phone_lines<S: ContactSource + 'static>(
    detail: &ContactDetail,
    app: &App<'_, S>,
) -> Vec<Line<'static>> {
    if detail.phone_numbers.is_empty() {
        return vec![Line::from("No phone numbers")];
    }
    detail
        .phone_numbers
        .iter()
        .map(|phone| {
            Line::from(vec![
                Span::styled("PHONE: ", header_text_style(app)),
                Span::raw(phone.number.clone()),
            ])
        })
        .collect()
}

fn draw_image<S: ContactSource + 'static>(frame: &mut Frame<'_>, area: Rect, app: &mut App<'_, S>) {
    if area.width == 0 || area.height == 0 {
        return;
    }

    frame.render_widget(Clear, area);

    if let Some(state) = app.profile_image_state() {
        let widget = StatefulImage::new(None).resize(Resize::Fit);
        frame.render_stateful_widget(widget, area, state);
        return;
    }

    let message = app.photo_error().unwrap_or("NO IMAGE AVAILABLE").to_string();
    render_centered_words(frame, area, &message);
}

fn draw_notice<S: ContactSource + 'static>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, S>) {
    let Some(notice) = app.screen.notice() else {
        return;
    };

    let width = (notice.message.chars().count() as u16)
        .saturating_add(6)
        .max(46)
        .min(area.width);
    let height = 6u16.min(area.height);
    let modal_area = centered(area, width, height);

    frame.render_widget(Clear, modal_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(format!(" {} ", notice.title), header_text_style(app)))
        .title_alignment(Alignment::Center);
    let inner = block.inner(modal_area);
    frame.render_widget(block, modal_area);

    let mut lines = vec![Line::from(notice.message.clone())];
    if notice.kind == NoticeKind::PermissionDenied {
        lines.push(Line::from(Span::styled(
            "Check the vdir path and its permissions.",
            header_text_style(app),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("OK", selection_style(app))));
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn selection_style<S: ContactSource + 'static>(app: &App<'_, S>) -> Style {
    let colors = app.ui_colors();
    Style::default()
        .fg(color(colors.selection_fg))
        .bg(color(colors.selection_bg))
}

fn border_style<S: ContactSource + 'static>(app: &App<'_, S>) -> Style {
    Style::default().fg(color(app.ui_colors().border))
}

fn header_text_style<S: ContactSource + 'static>(app: &App<'_, S>) -> Style {
    Style::default().fg(color(app.ui_colors().separator))
}

fn render_centered_words(frame: &mut Frame<'_>, area: Rect, text: &str) {
    if area.width == 0 || area.height == 0 {
        return;
    }

    let mut lines: Vec<Line> = text
        .split_whitespace()
        .map(|word| Line::from(word.to_string()))
        .collect();

    if lines.is_empty() {
        return;
    }

    if lines.len() as u16 > area.height {
        lines.truncate(area.height as usize);
    }

    let height = lines.len() as u16;
    let start_y = area.y + (area.height.saturating_sub(height)) / 2;
    let target = Rect {
        x: area.x,
        y: start_y,
        width: area.width,
        height,
    };

    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), target);
}

/// Header line over a `├───┤` separator joined to the pane's side borders.
fn render_header_with_separator<S: ContactSource + 'static>(
    frame: &mut Frame<'_>,
    area: Rect,
    content: Line<'static>,
    app: &App<'_, S>,
    outer_width: u16,
) {
    if area.width == 0 || area.height == 0 {
        return;
    }

    if area.height == 1 {
        frame.render_widget(Paragraph::new(content), area);
        return;
    }

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    frame.render_widget(Paragraph::new(content), layout[0]);

    let inner_width = outer_width.saturating_sub(2) as usize;
    let separator = format!(
        "{}{}{}",
        LINE.vertical_right,
        LINE.horizontal.repeat(inner_width),
        LINE.vertical_left
    );
    let separator_area = Rect {
        x: layout[1].x.saturating_sub(1),
        y: layout[1].y,
        width: outer_width,
        height: 1,
    };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(separator, header_text_style(app)))),
        separator_area,
    );
}

fn color(rgb: RgbColor) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}
