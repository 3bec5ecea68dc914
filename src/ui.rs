use crate::app::{App, ConfirmStep, ModalState, PaneFocus};
use crate::domain::ListView;
use crate::error::Route;
use crate::feed::{self, FeedStatus};
use crate::forms::FormState;
use crate::table::{self, DEVICE_USER_COLUMNS};
use crate::tree::SelectionMark;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::{Alignment, Color, Line, Modifier, Span, Style};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState,
    Tabs, Wrap,
};

pub fn draw(frame: &mut Frame, app: &mut App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_tabs(frame, app, outer[0]);
    if let Some(route) = app.route {
        draw_route(frame, route, outer[1]);
    } else {
        draw_body(frame, app, outer[1]);
    }
    draw_status_bar(frame, app, outer[2]);
    draw_modal(frame, app);
}

fn draw_body(frame: &mut Frame, app: &mut App, area: Rect) {
    let (main, log) = {
        let split = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(72), Constraint::Percentage(28)])
            .split(area);
        (split[0], split[1])
    };

    match app.view {
        ListView::Dashboard => draw_dashboard(frame, app, main),
        view if view.shows_tree() => {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
                .split(main);
            draw_tree(frame, app, columns[0]);
            draw_records(frame, app, columns[1]);
        }
        ListView::Terminals => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(main);
            draw_records(frame, app, rows[0]);
            draw_device_users(frame, app, rows[1]);
        }
        _ => draw_records(frame, app, main),
    }
    draw_logs(frame, app, log);
}

fn pane_style(app: &App, pane: PaneFocus) -> Style {
    if app.focus == pane {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn highlight_style() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::LightGreen)
        .add_modifier(Modifier::BOLD)
}

fn draw_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = ListView::ALL
        .iter()
        .map(|view| {
            let badge = match view.resource() {
                Some(_) if view.employee_type().is_some() && app.view == *view => {
                    app.employee_records().len().to_string()
                }
                Some(resource) => app.loads.state(resource).badge(),
                None if *view == ListView::Transactions => app.transactions.len().to_string(),
                None => String::new(),
            };
            if badge.is_empty() {
                Line::from(format!("{} {}", view.shortcut(), view.title()))
            } else {
                Line::from(format!("{} {} ({badge})", view.shortcut(), view.title()))
            }
        })
        .collect();
    let selected = ListView::ALL
        .iter()
        .position(|view| *view == app.view)
        .unwrap_or_default();

    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .divider("|");
    frame.render_widget(tabs, area);
}

fn draw_route(frame: &mut Frame, route: Route, area: Rect) {
    let hint = match route {
        Route::Unauthorized => "The backend rejected the session token. Set NCLOCK_TOKEN or auth_token and restart.",
        Route::NotFound => "The backend could not serve the requested resource.",
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            route.title(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(hint),
        Line::from(""),
        Line::from("Esc / Enter: back  q: quit"),
    ];
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn draw_tree(frame: &mut Frame, app: &mut App, area: Rect) {
    let viewport = area.height.saturating_sub(2) as usize;
    app.tree.sync_scroll(viewport);

    let items: Vec<ListItem> = app
        .tree
        .visible_rows()
        .iter()
        .map(|row| {
            let mark = match row.mark {
                SelectionMark::Full => "[x]",
                SelectionMark::Partial => "[~]",
                SelectionMark::None => "[ ]",
            };
            let arrow = match (row.has_children, row.expanded) {
                (true, true) => "▾ ",
                (true, false) => "▸ ",
                (false, _) => "  ",
            };
            let indent = "  ".repeat(row.depth);
            ListItem::new(format!("{indent}{arrow}{mark} {}", row.label))
        })
        .collect();

    let title = if app.tree.search().is_empty() {
        " Hierarchy ".to_string()
    } else {
        format!(" Hierarchy /{} ", app.tree.search())
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(pane_style(app, PaneFocus::Tree)),
        )
        .highlight_style(highlight_style());

    let mut state = ListState::default().with_offset(app.tree.scroll());
    if !app.tree.visible_rows().is_empty() {
        state.select(Some(app.tree.cursor()));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_records(frame: &mut Frame, app: &mut App, area: Rect) {
    let viewport = area.height.saturating_sub(3) as usize;
    app.sync_list_scroll(viewport);

    let columns = table::visible_columns(app.view, &app.config.columns);
    let resource = app.view.resource();
    let selected_terminal = app.selected_terminal.clone();
    let rows_data = app.current_rows();
    let count = rows_data.len();

    let rows: Vec<Row> = rows_data
        .iter()
        .map(|record| {
            let marked = app.view == ListView::Terminals
                && resource
                    .and_then(|resource| resource.record_id(record))
                    .is_some_and(|id| selected_terminal.as_deref() == Some(id.as_str()));
            let style = if marked {
                Style::default().fg(Color::LightYellow)
            } else if app.view == ListView::Transactions && feed::is_invalid_record(record) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Row::new(
                columns
                    .iter()
                    .map(|column| Cell::from(table::cell_text(record, &column.key))),
            )
            .style(style)
        })
        .collect();

    let header = Row::new(columns.iter().map(|column| Cell::from(column.label.clone()))).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );
    let widths = vec![Constraint::Fill(1); columns.len().max(1)];

    let mut title = format!(" {} ({count}) ", app.view.title());
    if !app.table_filter.is_empty() {
        title.push_str(&format!("/{} ", app.table_filter));
    }
    if app.view.shows_tree() && !app.tree.selection().is_empty() {
        title.push_str("[tree selection] ");
    }
    if app.view == ListView::Transactions {
        title.push_str(&format!("[feed {}] ", app.feed_status.label()));
    }

    let table_widget = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(pane_style(app, PaneFocus::Table)),
        )
        .row_highlight_style(highlight_style())
        .highlight_symbol("▶ ");

    let mut state = TableState::default().with_offset(app.list_scroll());
    if count > 0 {
        state.select(Some(app.selected_index));
    }
    frame.render_stateful_widget(table_widget, area, &mut state);
}

fn draw_device_users(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.selected_terminal_name() {
        Some(name) => format!(
            " Users on {name} ({}) u: filter ",
            app.device_user_filter.title()
        ),
        None => " Users on terminal (space: select a terminal) ".to_string(),
    };
    let rows: Vec<Row> = app
        .visible_device_users()
        .into_iter()
        .map(|user| Row::new(table::device_user_cells(user).map(Cell::from)))
        .collect();
    let header = Row::new(DEVICE_USER_COLUMNS.iter().map(|label| Cell::from(*label))).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );
    let widths = [
        Constraint::Length(12),
        Constraint::Fill(2),
        Constraint::Fill(1),
        Constraint::Length(18),
        Constraint::Length(6),
    ];
    let widget = Table::new(rows, widths)
        .header(header)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn draw_dashboard(frame: &mut Frame, app: &App, area: Rect) {
    let summary = &app.dashboard;
    let mut lines = vec![
        Line::from(format!("Employees     {}", summary.employees)),
        Line::from(format!("Departments   {}", summary.departments)),
        Line::from(format!("Groups        {}", summary.groups)),
        Line::from(format!("Terminals     {}", summary.terminals)),
        Line::from(format!(
            "Transactions  {} (feed {})",
            app.transactions.len(),
            app.feed_status.label()
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Upcoming birthdays",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];
    if summary.birthdays.is_empty() {
        lines.push(Line::from("  none in the next 30 days"));
    }
    for birthday in &summary.birthdays {
        let when = match birthday.days_until {
            0 => "today".to_string(),
            1 => "tomorrow".to_string(),
            days => format!("in {days} days"),
        };
        lines.push(Line::from(format!(
            "  {}  {}  ({when})",
            birthday.date.format("%d/%m"),
            birthday.name
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(" Dashboard ")
                .borders(Borders::ALL)
                .border_style(pane_style(app, PaneFocus::Table)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn draw_logs(frame: &mut Frame, app: &App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    let end = app.logs.len().saturating_sub(app.log_tail_offset);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = app.logs[start..end]
        .iter()
        .map(|line| Line::from(line.as_str()))
        .collect();

    let title = if app.log_tail_offset > 0 {
        format!(" Log (+{}) ", app.log_tail_offset)
    } else {
        " Log ".to_string()
    };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(pane_style(app, PaneFocus::Log)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, area);
}

fn key_hints(app: &App) -> &'static str {
    match (app.focus, app.view) {
        (PaneFocus::Tree, _) => "j/k move  h/l fold  space select  c clear  / search",
        (PaneFocus::Log, _) => "j/k PgUp/PgDn scroll",
        (PaneFocus::Table, ListView::Terminals) => {
            "space terminal  a commands  u users filter  n/e/y/x edit  / filter"
        }
        (PaneFocus::Table, ListView::Transactions) => "j/k move  / filter  o columns",
        (PaneFocus::Table, ListView::Dashboard) => "r refresh",
        (PaneFocus::Table, _) => "n new  e edit  y duplicate  x delete  o columns  / filter",
    }
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let busy = app.is_busy();
    let feed_style = match app.feed_status {
        FeedStatus::Connected => Style::default().fg(Color::Green),
        FeedStatus::Failed(_) => Style::default().fg(Color::Red),
        FeedStatus::Connecting | FeedStatus::Closed => Style::default().fg(Color::Gray),
    };
    let text = Line::from(vec![
        Span::styled(
            if busy { " BUSY " } else { " IDLE " },
            if busy {
                Style::default().bg(Color::Yellow).fg(Color::Black)
            } else {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            },
        ),
        Span::raw(" "),
        Span::styled(format!("feed:{}", app.feed_status.label()), feed_style),
        Span::raw("  "),
        Span::styled(
            "tab focus | 1-9,0 views | r/R refresh | ? help | q quit",
            Style::default().fg(Color::Gray),
        ),
        Span::raw("  "),
        Span::styled(key_hints(app), Style::default().fg(Color::Gray)),
    ]);

    let paragraph = Paragraph::new(text).alignment(Alignment::Left);
    frame.render_widget(paragraph, area);
}

fn draw_modal(frame: &mut Frame, app: &App) {
    match &app.modal {
        ModalState::None => {}
        ModalState::Help => draw_help(frame),
        ModalState::TreeSearch { value, .. } => {
            draw_input(frame, " Search hierarchy ", value, "Enter: keep  Esc: restore")
        }
        ModalState::TableFilter { value, .. } => {
            draw_input(frame, " Filter rows ", value, "Enter: keep  Esc: restore")
        }
        ModalState::CommandMenu { selected, filter } => {
            let area = centered_rect(60, 60, frame.area());
            frame.render_widget(Clear, area);

            let commands = App::command_menu_items(filter);
            let items: Vec<ListItem> = commands
                .iter()
                .map(|command| {
                    let item = ListItem::new(format!(
                        "{:<20} {}",
                        command.label(),
                        command.description()
                    ));
                    if command.is_dangerous() {
                        item.style(Style::default().fg(Color::LightRed))
                    } else {
                        item
                    }
                })
                .collect();

            let title = match app.selected_terminal_name() {
                Some(name) => format!(" Commands for {name} /{filter} "),
                None => format!(" Commands /{filter} "),
            };
            let list = List::new(items)
                .block(
                    Block::default()
                        .title(title)
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Cyan)),
                )
                .highlight_style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::LightYellow)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("▶ ");

            let mut state = ListState::default();
            if !commands.is_empty() {
                state.select(Some(*selected));
            }
            frame.render_stateful_widget(list, area, &mut state);
        }
        ModalState::ColumnPicker { selected } => {
            let area = centered_rect(50, 60, frame.area());
            frame.render_widget(Clear, area);

            let chosen = table::selected_keys(app.view, &app.config.columns);
            let items: Vec<ListItem> = table::catalogue(app.view)
                .into_iter()
                .map(|column| {
                    let mark = if chosen.contains(&column.key) { "[x]" } else { "[ ]" };
                    ListItem::new(format!("{mark} {}", column.label))
                })
                .collect();
            let list = List::new(items)
                .block(
                    Block::default()
                        .title(" Columns  space toggle  a all  r reset ")
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::LightBlue)),
                )
                .highlight_style(highlight_style());
            let mut state = ListState::default();
            state.select(Some(*selected));
            frame.render_stateful_widget(list, area, &mut state);
        }
        ModalState::Confirm {
            pending,
            step,
            typed,
        } => {
            let area = centered_rect(70, 40, frame.area());
            frame.render_widget(Clear, area);
            let title = match step {
                ConfirmStep::Primary => " Confirm ",
                ConfirmStep::DangerPhrase => " Dangerous Operation ",
            };
            let phrase = pending.danger_phrase(app.config.require_two_step_confirmation);

            let mut lines = vec![Line::from(pending.summary()), Line::from("")];
            match step {
                ConfirmStep::Primary => {
                    lines.push(Line::from("Enter: continue  Esc: cancel"));
                    if phrase.is_some() {
                        lines.push(Line::from(
                            "The next step asks for a confirmation phrase.",
                        ));
                    }
                }
                ConfirmStep::DangerPhrase => {
                    lines.push(Line::from("Type the phrase and press Enter, Esc to cancel"));
                    if let Some(phrase) = phrase {
                        lines.push(
                            Line::from(format!("required: {phrase}")).style(
                                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                            ),
                        );
                    }
                    lines.push(
                        Line::from(format!("input: {typed}"))
                            .style(Style::default().fg(Color::Yellow)),
                    );
                }
            }

            let p = Paragraph::new(lines)
                .block(
                    Block::default()
                        .title(title)
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::LightRed)),
                )
                .wrap(Wrap { trim: false });
            frame.render_widget(p, area);
        }
        ModalState::Form(form) => draw_form(frame, form),
    }
}

fn draw_help(frame: &mut Frame) {
    let area = centered_rect(70, 80, frame.area());
    frame.render_widget(Clear, area);
    let lines: Vec<Line> = [
        "Global",
        "  1-9, 0       switch view",
        "  tab          cycle focus",
        "  r / R        refresh view / everything",
        "  q, Ctrl+C    quit",
        "Hierarchy",
        "  j/k h/l      move, collapse, expand",
        "  space        select branch or employee",
        "  c            clear selection",
        "  /            search (matches keep their ancestors)",
        "Tables",
        "  j/k          move",
        "  /            filter rows",
        "  n e y x      new, edit, duplicate, delete",
        "  o            choose columns",
        "Terminals",
        "  space        select terminal and load its users",
        "  a            device commands",
        "  u            cycle users filter",
    ]
    .into_iter()
    .map(Line::from)
    .collect();
    let p = Paragraph::new(lines).block(
        Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(p, area);
}

fn draw_input(frame: &mut Frame, title: &str, value: &str, hint: &str) {
    let area = centered_rect(60, 20, frame.area());
    frame.render_widget(Clear, area);
    let lines = vec![
        Line::from(format!("> {value}")).style(Style::default().fg(Color::Yellow)),
        Line::from(""),
        Line::from(hint.to_string()),
    ];
    let p = Paragraph::new(lines).block(
        Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::LightBlue)),
    );
    frame.render_widget(p, area);
}

fn draw_form(frame: &mut Frame, form: &FormState) {
    let area = centered_rect(70, 80, frame.area());
    frame.render_widget(Clear, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(2)])
        .split(area);

    let items: Vec<ListItem> = form
        .fields()
        .iter()
        .zip(&form.values)
        .map(|(field, value)| {
            let required = if field.required { "*" } else { " " };
            ListItem::new(format!("{required} {:<28} {value}", field.label))
        })
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(" {} ", form.title()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightBlue)),
        )
        .highlight_style(highlight_style())
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    state.select(Some(form.selected));
    frame.render_stateful_widget(list, layout[0], &mut state);

    let footer = match &form.error {
        Some(error) => Line::from(error.as_str()).style(Style::default().fg(Color::Red)),
        None => Line::from("tab/↑↓ field  Enter save  Esc cancel"),
    };
    frame.render_widget(Clear, layout[1]);
    frame.render_widget(Paragraph::new(footer), layout[1]);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
