use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

use crate::analysis::{self, RefreshState};
use crate::comfy_table::{format_market_cap, format_timestamp, format_volume, get_visibility_ratio};
use crate::history_store::{Direction, PerformerHistoryRow, SnapshotStore};
use crate::price_history::PriceProvider;
use crate::ranking::{SortKey, top_and_bottom};
use crate::snapshot::TickerSnapshot;
use crate::storage_utils::AppConfig;

// --- Refresh timing ---

/// Fixed-period timer polled from the event loop.
#[derive(Debug)]
pub struct RefreshTimer {
    period: Duration,
    next: Instant,
}

impl RefreshTimer {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    /// True once per elapsed period; re-arms from `now`.
    pub fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.period;
        true
    }

    /// Pushes the next tick out after a manual refresh.
    pub fn reset(&mut self, now: Instant) {
        self.next = now + self.period;
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }
}

// --- Data & App State ---

#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub state: RefreshState,
    pub history_best: Vec<PerformerHistoryRow>,
    pub history_worst: Vec<PerformerHistoryRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Top,
    Bottom,
    HistoryBest,
    HistoryWorst,
}

const VIEWS: [(View, &str); 4] = [
    (View::Top, "Top Performers"),
    (View::Bottom, "Bottom Performers"),
    (View::HistoryBest, "Historical Top"),
    (View::HistoryWorst, "Historical Bottom"),
];

struct App {
    data: DashboardData,
    /// Startup config plus in-session changes such as the sort key.
    config: AppConfig,
    is_refreshing: bool,
    selected_view: usize,
    timer: RefreshTimer,
}

impl App {
    fn new(config: AppConfig) -> Self {
        let timer = RefreshTimer::new(Duration::from_secs(config.refresh_secs.max(1)), Instant::now());
        Self {
            data: DashboardData::default(),
            config,
            is_refreshing: false,
            selected_view: 0,
            timer,
        }
    }

    /// Moves to the next sort key and re-ranks the snapshots already loaded.
    fn cycle_sort_key(&mut self) {
        self.config.sort_key = match self.config.sort_key {
            SortKey::PercentChange => SortKey::PriceChange,
            SortKey::PriceChange => SortKey::AvgVolume,
            SortKey::AvgVolume => SortKey::MarketCap,
            SortKey::MarketCap => SortKey::CurrentPrice,
            SortKey::CurrentPrice => SortKey::PercentChange,
        };
        self.data.state.ranking =
            top_and_bottom(&self.data.state.snapshots, self.config.sort_key, self.config.top_n);
    }

    fn set_data(&mut self, new_data: DashboardData) {
        self.data = new_data;
        self.is_refreshing = false;
    }

    fn view(&self) -> View {
        VIEWS[self.selected_view].0
    }
}

// --- Data Loading ---

async fn load_dashboard<P, S>(
    previous: RefreshState,
    config: &AppConfig,
    provider: &P,
    store: &S,
) -> DashboardData
where
    P: PriceProvider + Sync,
    S: SnapshotStore + Sync,
{
    let state = analysis::refresh(previous, config, provider, Some(store)).await;

    let history = |direction| store.query_performers_history(config.history_days, config.top_n, direction);
    let history_best = history(Direction::Best).await.unwrap_or_else(|e| {
        warn!(error = %e, "history query failed");
        Vec::new()
    });
    let history_worst = history(Direction::Worst).await.unwrap_or_else(|e| {
        warn!(error = %e, "history query failed");
        Vec::new()
    });

    DashboardData {
        state,
        history_best,
        history_worst,
    }
}

// --- TUI ---

pub async fn run_tui<P, S>(config: AppConfig, provider: Arc<P>, store: Arc<S>) -> Result<()>
where
    P: PriceProvider + Send + Sync + 'static,
    S: SnapshotStore + Send + Sync + 'static,
{
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, config, provider, store).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

fn spawn_refresh<P, S>(
    app: &mut App,
    tx: &mpsc::Sender<DashboardData>,
    provider: &Arc<P>,
    store: &Arc<S>,
) where
    P: PriceProvider + Send + Sync + 'static,
    S: SnapshotStore + Send + Sync + 'static,
{
    if app.is_refreshing {
        return;
    }
    app.is_refreshing = true;
    app.timer.reset(Instant::now());

    let previous = app.data.state.clone();
    let config = app.config.clone();
    let (tx, provider, store) = (tx.clone(), provider.clone(), store.clone());
    tokio::spawn(async move {
        let data = load_dashboard(previous, &config, provider.as_ref(), store.as_ref()).await;
        let _ = tx.send(data).await;
    });
}

async fn run_app<B, P, S>(
    terminal: &mut Terminal<B>,
    config: AppConfig,
    provider: Arc<P>,
    store: Arc<S>,
) -> Result<()>
where
    B: Backend,
    P: PriceProvider + Send + Sync + 'static,
    S: SnapshotStore + Send + Sync + 'static,
{
    let (data_tx, mut data_rx) = mpsc::channel::<DashboardData>(1);
    let mut app = App::new(config);
    spawn_refresh(&mut app, &data_tx, &provider, &store);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if let Ok(new_data) = data_rx.try_recv() {
            app.set_data(new_data);
        }

        if app.timer.due(Instant::now()) {
            spawn_refresh(&mut app, &data_tx, &provider, &store);
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => match handle_key_event(key, &mut app) {
                    KeyAction::Quit => return Ok(()),
                    KeyAction::Refresh => {
                        spawn_refresh(&mut app, &data_tx, &provider, &store)
                    }
                    KeyAction::None => {}
                },
                // next draw picks up the new size
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }
}

enum KeyAction {
    Quit,
    Refresh,
    None,
}

fn handle_key_event(key: KeyEvent, app: &mut App) -> KeyAction {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
        KeyCode::F(5) | KeyCode::Char('r') if !app.is_refreshing => return KeyAction::Refresh,
        KeyCode::Char('s') => app.cycle_sort_key(),
        KeyCode::Up => {
            app.selected_view = app.selected_view.checked_sub(1).unwrap_or(VIEWS.len() - 1);
        }
        KeyCode::Down => {
            app.selected_view = (app.selected_view + 1) % VIEWS.len();
        }
        KeyCode::Char(c) => {
            if let Some(digit) = c.to_digit(10) {
                if digit > 0 && digit as usize <= VIEWS.len() {
                    app.selected_view = (digit - 1) as usize;
                }
            }
        }
        _ => {}
    }
    KeyAction::None
}

fn ui(f: &mut Frame, app: &App) {
    let main_layout = Layout::horizontal([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(f.size());
    let right_chunks =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(main_layout[1]);

    // Sidebar
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Views")
        .title_alignment(Alignment::Center);
    let inner_sidebar_area = sidebar_block.inner(main_layout[0]);
    f.render_widget(sidebar_block, main_layout[0]);

    let sidebar_chunks = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(3),
    ])
    .split(inner_sidebar_area);

    let view_lines: Vec<Line> = VIEWS
        .iter()
        .enumerate()
        .map(|(i, (_, name))| {
            let line = Line::from(format!("{}. {}", i + 1, name));
            if i == app.selected_view {
                line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
            } else {
                line
            }
        })
        .collect();
    f.render_widget(Paragraph::new(view_lines), sidebar_chunks[0]);
    f.render_widget(
        Paragraph::new(format!(
            "F5 refresh | s sort\nSort: {}\nNext in {}s",
            app.config.sort_key,
            app.timer.remaining(Instant::now()).as_secs()
        ))
        .alignment(Alignment::Center),
        sidebar_chunks[1],
    );

    let state = &app.data.state;
    let mut title = format!("Last Updated: {}", format_timestamp(state.last_refresh));
    if !state.skipped.is_empty() {
        title.push_str(&format!(" | no data: {}", state.skipped.len()));
    }
    if state.last_store_error.is_some() {
        title.push_str(" | history not saved");
    }
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title_alignment(Alignment::Center)
            .title(title),
        right_chunks[0],
    );

    let view_name = VIEWS[app.selected_view].1;
    let table = match app.view() {
        View::Top => snapshot_table(&state.ranking.top, Color::Green),
        View::Bottom => snapshot_table(&state.ranking.bottom, Color::Red),
        View::HistoryBest => history_table(&app.data.history_best, Color::Green),
        View::HistoryWorst => history_table(&app.data.history_worst, Color::Red),
    };
    f.render_widget(
        table.block(Block::default().borders(Borders::ALL).title(view_name)),
        right_chunks[1],
    );

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Fetching price histories...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn shade(base: Color, ratio: f64) -> Color {
    let v = (255.0 * ratio) as u8;
    match base {
        Color::Red => Color::Rgb(v, 0, 0),
        _ => Color::Rgb(0, v, 0),
    }
}

fn snapshot_table(rows: &[TickerSnapshot], base: Color) -> Table<'static> {
    let header = Row::new(["Rank", "Asset", "Price", "Change (%)", "Avg Volume", "Market Cap"])
        .style(Style::default().bg(Color::DarkGray));
    let lead = rows.first().map_or(1.0, |s| s.percent_change.abs());
    let safe_lead = if lead == 0.0 { 1.0 } else { lead };

    let body: Vec<Row> = rows
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let ratio = get_visibility_ratio(s.percent_change.abs(), safe_lead);
            let cyan = (255.0 * ratio) as u8;
            Row::new([
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format!("{} ({})", s.company_name, s.ticker))
                    .style(Style::default().fg(Color::Rgb(0, cyan, cyan))),
                Cell::from(format!("{:.2}", s.current_price)),
                Cell::from(format!("{:.2}%", s.percent_change))
                    .style(Style::default().fg(shade(base, ratio))),
                Cell::from(format_volume(s.avg_volume)),
                Cell::from(format_market_cap(s.market_cap)),
            ])
        })
        .collect();

    Table::new(
        body,
        [
            Constraint::Length(6),
            Constraint::Percentage(36),
            Constraint::Percentage(14),
            Constraint::Percentage(14),
            Constraint::Percentage(18),
            Constraint::Percentage(14),
        ],
    )
    .header(header)
}

fn history_table(rows: &[PerformerHistoryRow], base: Color) -> Table<'static> {
    let header = Row::new(["Rank", "Ticker", "Avg Change (%)", "Last Price", "Avg Volume"])
        .style(Style::default().bg(Color::DarkGray));
    let body: Vec<Row> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            Row::new([
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(r.ticker.clone()),
                Cell::from(format!("{:.2}%", r.mean_percent_change))
                    .style(Style::default().fg(base)),
                Cell::from(format!("{:.2}", r.last_price)),
                Cell::from(format_volume(r.mean_volume)),
            ])
        })
        .collect();

    Table::new(
        body,
        [
            Constraint::Length(6),
            Constraint::Percentage(30),
            Constraint::Percentage(22),
            Constraint::Percentage(20),
            Constraint::Percentage(22),
        ],
    )
    .header(header)
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history_store::JsonSnapshotStore;
    use crate::price_history::ProviderError;
    use crate::series::PriceSeries;
    use crate::series::test_support::series_from_closes;
    use crate::storage_utils::AsyncStorageManager;
    use crate::timeframe::{Interval, Period};
    use std::collections::BTreeMap;

    struct TwoTickers;

    impl PriceProvider for TwoTickers {
        async fn fetch(
            &self,
            symbol: &str,
            _period: Period,
            _interval: Interval,
        ) -> std::result::Result<PriceSeries, ProviderError> {
            // A leads on price change, B on percent change
            let closes: &[f64] = match symbol {
                "A" => &[100.0, 110.0],
                "B" => &[10.0, 12.0],
                _ => return Err(ProviderError::NoData(symbol.to_string())),
            };
            Ok(PriceSeries::new(symbol, series_from_closes(closes).bars().to_vec())?)
        }
    }

    #[tokio::test]
    async fn chosen_sort_key_is_used_by_later_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(AsyncStorageManager::new(dir.path()).await.unwrap());
        let config = AppConfig {
            watchlist: BTreeMap::from([
                ("A".to_string(), "Alpha".to_string()),
                ("B".to_string(), "Beta".to_string()),
            ]),
            top_n: 1,
            sort_key: SortKey::PercentChange,
            ..AppConfig::default()
        };
        let mut app = App::new(config);

        let data = load_dashboard(app.data.state.clone(), &app.config, &TwoTickers, &store).await;
        app.set_data(data);
        assert_eq!(app.data.state.ranking.top[0].ticker, "B");

        app.cycle_sort_key();
        assert_eq!(app.config.sort_key, SortKey::PriceChange);
        assert_eq!(app.data.state.ranking.top[0].ticker, "A");

        let data = load_dashboard(app.data.state.clone(), &app.config, &TwoTickers, &store).await;
        app.set_data(data);
        assert_eq!(app.data.state.ranking.top[0].ticker, "A");
        assert_eq!(app.data.state.refresh_count, 2);
    }

    #[test]
    fn timer_fires_once_per_period() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(30), start);

        assert!(!timer.due(start + Duration::from_secs(29)));
        assert!(timer.due(start + Duration::from_secs(30)));
        assert!(!timer.due(start + Duration::from_secs(31)));
        assert!(timer.due(start + Duration::from_secs(60)));
    }

    #[test]
    fn reset_postpones_next_tick() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(10), start);
        timer.reset(start + Duration::from_secs(8));

        assert!(!timer.due(start + Duration::from_secs(12)));
        assert_eq!(
            timer.remaining(start + Duration::from_secs(12)),
            Duration::from_secs(6)
        );
    }
}
