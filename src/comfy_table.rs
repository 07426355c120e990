use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

use crate::analysis::RefreshState;
use crate::history_store::{FrequencyRow, PerformerHistoryRow};
use crate::indicators::RsiZone;
use crate::metrics::{ComparisonRow, TickerAnalysis};
use crate::ranking::SortKey;
use crate::snapshot::{MarketRegion, PersistedSnapshot, TickerSnapshot};

/// Dims rows further from the leader, never below 40%.
pub fn get_visibility_ratio(current: f64, top: f64) -> f64 {
    if top <= 0.0 {
        1.0
    } else {
        (0.4 + 0.6 * (current / top)).max(0.4)
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|dt| dt.format("%d-%m-%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

pub fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

pub fn format_volume(volume: f64) -> String {
    let raw = format!("{:.0}", volume);
    let (sign, digits) = raw.split_at(if raw.starts_with('-') { 1 } else { 0 });
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("{sign}{out}")
}

pub fn format_market_cap(cap: Option<f64>) -> String {
    cap.map_or_else(|| "N/A".to_string(), |c| format!("{:.2}B", c / 1e9))
}

fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let cell = Cell::new(label).add_attribute(Attribute::Bold);
            if i > 1 {
                cell.set_alignment(CellAlignment::Right)
            } else {
                cell
            }
        })
        .collect()
}

fn new_table(labels: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(labels));
    table
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn key_value(snapshot: &TickerSnapshot, key: SortKey) -> String {
    match key {
        SortKey::PercentChange => format!("{:.2}%", snapshot.percent_change),
        SortKey::AvgVolume => format_volume(snapshot.avg_volume),
        SortKey::MarketCap => format_market_cap(snapshot.market_cap),
        _ => format_opt(key.value(snapshot)),
    }
}

pub fn ranking_table(title_gainers: bool, rows: &[TickerSnapshot], key: SortKey) -> Table {
    let mut table = new_table(&["Rank", "Asset", "Region", "Price", key.label()]);

    let lead = rows.first().and_then(|s| key.value(s)).map(f64::abs).unwrap_or(1.0);
    let safe_lead = if lead == 0.0 { 1.0 } else { lead };

    for (rank, snapshot) in rows.iter().enumerate() {
        let magnitude = key.value(snapshot).map(f64::abs).unwrap_or(0.0);
        let ratio = get_visibility_ratio(magnitude, safe_lead);
        let shade = (255.0 * ratio) as u8;
        let gray = (150.0 * ratio) as u8;
        let value_color = if title_gainers {
            Color::Rgb { r: 0, g: shade, b: 0 }
        } else {
            Color::Rgb { r: shade, g: 0, b: 0 }
        };

        table.add_row(vec![
            Cell::new(rank + 1).fg(Color::DarkGrey),
            Cell::new(format!("{} ({})", snapshot.company_name, snapshot.ticker)).fg(Color::Rgb {
                r: 0,
                g: shade,
                b: shade,
            }),
            Cell::new(MarketRegion::from_ticker(&snapshot.ticker)).fg(Color::Rgb {
                r: gray,
                g: gray,
                b: gray,
            }),
            right(format!("{:.2}", snapshot.current_price)),
            right(key_value(snapshot, key)).fg(value_color),
        ]);
    }
    table
}

pub fn render_ranking(state: &RefreshState, key: SortKey) -> String {
    if state.snapshots.is_empty() {
        return "No data available. Please try again later.".to_string();
    }
    let mut out = format!(
        "(Data taken at {} UTC, {} tickers ranked)\n",
        format_timestamp(state.last_refresh),
        state.snapshots.len()
    );
    out.push_str(&format!(
        "\nTop {} by {}\n{}\n",
        state.ranking.top.len(),
        key.label(),
        ranking_table(true, &state.ranking.top, key)
    ));
    out.push_str(&format!(
        "\nBottom {} by {}\n{}\n",
        state.ranking.bottom.len(),
        key.label(),
        ranking_table(false, &state.ranking.bottom, key)
    ));
    if !state.skipped.is_empty() {
        out.push_str(&format!("\nNo data for: {}\n", state.skipped.join(", ")));
    }
    if let Some(err) = &state.last_store_error {
        out.push_str(&format!("History not saved: {}\n", err));
    }
    out
}

pub fn render_analysis(symbol: &str, analysis: &TickerAnalysis, rows: usize) -> String {
    let s = &analysis.summary;
    let mut summary = new_table(&["Metric", "Value"]);
    for (label, value) in [
        ("Close", format!("{:.2}", s.last_close)),
        ("Period High", format!("{:.2}", s.high)),
        ("Period Low", format!("{:.2}", s.low)),
        ("Avg. Price", format!("{:.2}", s.avg_close)),
        ("Avg. Volume", format_volume(s.avg_volume)),
        (
            "Change",
            format!("{:.2} ({}%)", s.change, format_opt(s.percent)),
        ),
        ("Daily Volatility", format!("{}%", format_opt(analysis.returns.std_dev))),
        ("Avg Gain on Up Days", format!("{}%", format_opt(analysis.returns.avg_gain))),
        ("Avg Loss on Down Days", format!("{}%", format_opt(analysis.returns.avg_loss))),
        (
            "Up / Down / Flat Days",
            format!(
                "{} / {} / {}",
                analysis.returns.positive_days,
                analysis.returns.negative_days,
                analysis.returns.neutral_days
            ),
        ),
    ] {
        summary.add_row(vec![Cell::new(label), right(value)]);
    }

    let derived = &analysis.derived;
    let mut labels: Vec<String> = vec!["Date".into(), "Close".into()];
    labels.extend(derived.ma_windows.iter().map(|w| format!("MA{w}")));
    labels.extend(["MACD", "Signal", "RSI", "Zone", "BB Upper", "BB Lower", "Return %"].map(String::from));
    let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    let mut detail = new_table(&label_refs);

    let start = derived.points.len().saturating_sub(rows);
    for point in &derived.points[start..] {
        let mut cells = vec![
            Cell::new(point.timestamp.format("%Y-%m-%d")),
            right(format!("{:.2}", point.close)),
        ];
        cells.extend(point.moving_averages.iter().map(|ma| right(format_opt(*ma))));
        cells.push(right(format!("{:.2}", point.macd.macd)));
        cells.push(right(format!("{:.2}", point.macd.signal)));
        cells.push(right(format_opt(point.rsi)));
        cells.push(Cell::new(point.rsi.map_or("-", |r| RsiZone::classify(r).label())));
        cells.push(right(format_opt(point.bollinger.map(|b| b.upper))));
        cells.push(right(format_opt(point.bollinger.map(|b| b.lower))));
        cells.push(right(format_opt(point.daily_return)));
        detail.add_row(cells);
    }

    let mut volume = new_table(&["Price Range", "Volume"]);
    for bucket in &analysis.volume_profile {
        volume.add_row(vec![
            Cell::new(format!("{:.2} - {:.2}", bucket.low, bucket.high)),
            right(format_volume(bucket.volume)),
        ]);
    }

    let crossings = if analysis.crossovers.is_empty() {
        "none".to_string()
    } else {
        analysis
            .crossovers
            .iter()
            .map(|c| {
                format!(
                    "{} {:?}",
                    derived.points[c.index].timestamp.format("%Y-%m-%d"),
                    c.direction
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "\n{symbol}\n{summary}\n\nLast {} bars\n{detail}\n\nMA crossovers: {crossings}\n\nVolume by price\n{volume}\n",
        derived.points.len() - start
    )
}

pub fn render_recent(records: &[PersistedSnapshot]) -> String {
    if records.is_empty() {
        return "No database records found for this stock.".to_string();
    }
    let mut table = new_table(&[
        "Date", "Ticker", "Price", "Change", "Change (%)", "Volume", "Market Cap", "Index", "Period",
    ]);
    for r in records {
        table.add_row(vec![
            Cell::new(r.recorded_date.format("%Y-%m-%d %H:%M")),
            Cell::new(&r.snapshot.ticker),
            right(format!("{:.2}", r.snapshot.current_price)),
            right(format!("{:.2}", r.snapshot.price_change)),
            right(format!("{:.2}", r.snapshot.percent_change)),
            right(format_volume(r.snapshot.avg_volume)),
            right(format_market_cap(r.snapshot.market_cap)),
            Cell::new(&r.index_name),
            Cell::new(r.time_period),
        ]);
    }
    table.to_string()
}

pub fn render_performers(title: &str, rows: &[PerformerHistoryRow]) -> String {
    if rows.is_empty() {
        return format!("{title}: no historical data available yet.");
    }
    let mut table = new_table(&["Rank", "Ticker", "Change (%)", "Price", "Volume"]);
    for (i, row) in rows.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1).fg(Color::DarkGrey),
            Cell::new(&row.ticker),
            right(format!("{:.2}", row.mean_percent_change)),
            right(format!("{:.2}", row.last_price)),
            right(format_volume(row.mean_volume)),
        ]);
    }
    format!("{title}\n{table}")
}

pub fn render_frequency(title: &str, rows: &[FrequencyRow]) -> String {
    if rows.is_empty() {
        return format!("{title}: no historical data available yet.");
    }
    let mut table = new_table(&["Ticker", "Appearances", "Mean Change (%)"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.ticker),
            right(row.appearances.to_string()),
            right(format!("{:.2}", row.mean_percent_change)),
        ]);
    }
    format!("{title}\n{table}")
}

pub fn render_comparison(rows: &[ComparisonRow]) -> String {
    if rows.is_empty() {
        return "No data available. Please try again later.".to_string();
    }
    let mut table = new_table(&[
        "Ticker",
        "Company",
        "Perf (base 100)",
        "Volatility (%)",
        "Avg Daily (%)",
        "Max Gain (%)",
        "Max Loss (%)",
        "BB Width",
        "Avg Volume",
        "Max Volume",
        "Min Volume",
    ]);
    for row in rows {
        let perf = row.final_performance();
        let perf_color = match perf {
            Some(p) if p > 100.0 => Color::Green,
            Some(p) if p < 100.0 => Color::Red,
            _ => Color::Reset,
        };
        table.add_row(vec![
            Cell::new(&row.ticker),
            Cell::new(&row.company_name),
            right(format_opt(perf)).fg(perf_color),
            right(format_opt(row.returns.std_dev)),
            right(format_opt(row.returns.mean)),
            right(format_opt(row.returns.max)),
            right(format_opt(row.returns.min)),
            right(format_opt(row.bandwidth)),
            right(format_volume(row.volume.mean)),
            right(format_volume(row.volume.max)),
            right(format_volume(row.volume.min)),
        ]);
    }
    format!("Least to most volatile\n{table}")
}
