//! Single-page PDF dashboard
//!
//! Writes PDF 1.4 directly: one page, the two standard Helvetica fonts and a
//! single content stream of text and vector drawing operators.

use crate::error::Result;
use crate::render::ReportRenderer;
use crate::services::analytics_service::PortfolioReport;
use std::fmt::Write as _;

/// US Letter, points
const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const MARGIN: f64 = 40.0;

/// Holdings table rows beyond this are summarised
const MAX_TABLE_ROWS: usize = 12;

const PALETTE: [(f64, f64, f64); 8] = [
    (0.16, 0.38, 0.67),
    (0.90, 0.49, 0.13),
    (0.20, 0.60, 0.33),
    (0.80, 0.20, 0.20),
    (0.55, 0.35, 0.70),
    (0.55, 0.34, 0.29),
    (0.89, 0.47, 0.76),
    (0.50, 0.50, 0.50),
];

/// Portfolio dashboard renderer
#[derive(Debug, Default, Clone)]
pub struct PdfDashboardRenderer;

impl PdfDashboardRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl ReportRenderer for PdfDashboardRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn render(&self, report: &PortfolioReport) -> Result<Vec<u8>> {
        let mut page = Canvas::default();
        draw_dashboard(&mut page, report);
        Ok(assemble(&page.ops))
    }
}

/// Content stream builder. Coordinates are from the top-left corner.
#[derive(Default)]
struct Canvas {
    ops: String,
}

impl Canvas {
    fn text(&mut self, x: f64, y: f64, size: f64, bold: bool, text: &str) {
        let font = if bold { "F2" } else { "F1" };
        let _ = writeln!(
            self.ops,
            "BT /{} {} Tf {:.2} {:.2} Td ({}) Tj ET",
            font,
            size,
            x,
            PAGE_HEIGHT - y,
            escape(text)
        );
    }

    fn fill_color(&mut self, (r, g, b): (f64, f64, f64)) {
        let _ = writeln!(self.ops, "{:.3} {:.3} {:.3} rg", r, g, b);
    }

    fn stroke_color(&mut self, (r, g, b): (f64, f64, f64)) {
        let _ = writeln!(self.ops, "{:.3} {:.3} {:.3} RG", r, g, b);
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: bool) {
        let op = if fill { "f" } else { "S" };
        let _ = writeln!(
            self.ops,
            "{:.2} {:.2} {:.2} {:.2} re {}",
            x,
            PAGE_HEIGHT - y - h,
            w,
            h,
            op
        );
    }

    fn polyline(&mut self, points: &[(f64, f64)], width: f64) {
        let Some(((x0, y0), rest)) = points.split_first() else {
            return;
        };
        let _ = writeln!(self.ops, "{:.2} w", width);
        let _ = writeln!(self.ops, "{:.2} {:.2} m", x0, PAGE_HEIGHT - y0);
        for (x, y) in rest {
            let _ = writeln!(self.ops, "{:.2} {:.2} l", x, PAGE_HEIGHT - y);
        }
        self.ops.push_str("S\n");
    }
}

/// Escape a PDF literal string; non-ASCII is replaced
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn money(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

fn signed_money(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", money(value))
    } else {
        money(value)
    }
}

fn draw_dashboard(page: &mut Canvas, report: &PortfolioReport) {
    let black = (0.0, 0.0, 0.0);
    let grey = (0.45, 0.45, 0.45);
    let content_width = PAGE_WIDTH - 2.0 * MARGIN;

    // Header
    page.fill_color(black);
    page.text(MARGIN, 60.0, 20.0, true, "Portfolio Dashboard");
    page.fill_color(grey);
    page.text(
        MARGIN,
        78.0,
        9.0,
        false,
        &format!(
            "Report {} / Batch {}   Generated {}",
            report.report_id, report.batch_no, report.generated_at
        ),
    );

    // Summary box
    let daily_pct = if report.total_value != 0.0 {
        report.daily_pnl / report.total_value * 100.0
    } else {
        0.0
    };
    page.fill_color((0.94, 0.95, 0.97));
    page.rect(MARGIN, 92.0, content_width, 56.0, true);
    let summary = [
        ("Total Value", money(report.total_value)),
        (
            "Daily P&L",
            format!("{} ({:+.2}%)", signed_money(report.daily_pnl), daily_pct),
        ),
        ("Overall Return", format!("{:+.2}%", report.overall_return)),
    ];
    let column = content_width / summary.len() as f64;
    for (i, (label, value)) in summary.iter().enumerate() {
        let x = MARGIN + 12.0 + column * i as f64;
        page.fill_color(grey);
        page.text(x, 112.0, 9.0, false, label);
        page.fill_color(black);
        page.text(x, 134.0, 14.0, true, value);
    }

    // Holdings table
    let mut y = 176.0;
    page.text(MARGIN, y, 12.0, true, "Holdings");
    y += 18.0;
    let columns = [
        ("Ticker", 0.0),
        ("Shares", 80.0),
        ("Price", 150.0),
        ("Day %", 240.0),
        ("Value", 310.0),
        ("Cost Basis", 420.0),
    ];
    page.fill_color(grey);
    for (title, offset) in columns {
        page.text(MARGIN + offset, y, 9.0, true, title);
    }
    page.fill_color(black);
    for position in report.positions.iter().take(MAX_TABLE_ROWS) {
        y += 14.0;
        let cells = [
            position.ticker.clone(),
            position.shares.to_string(),
            money(position.current_price),
            format!("{:+.2}%", position.day_change),
            money(position.position_value),
            money(position.cost_basis),
        ];
        for ((_, offset), cell) in columns.iter().zip(cells.iter()) {
            page.text(MARGIN + offset, y, 9.0, false, cell);
        }
    }
    if report.positions.len() > MAX_TABLE_ROWS {
        y += 14.0;
        page.fill_color(grey);
        page.text(
            MARGIN,
            y,
            9.0,
            false,
            &format!("... and {} more", report.positions.len() - MAX_TABLE_ROWS),
        );
    }

    // Allocation by ticker
    y += 30.0;
    page.fill_color(black);
    page.text(MARGIN, y, 12.0, true, "Allocation");
    y += 10.0;
    if report.total_value > 0.0 {
        let mut x = MARGIN;
        for (i, position) in report.positions.iter().enumerate() {
            let w = content_width * position.position_value / report.total_value;
            page.fill_color(PALETTE[i % PALETTE.len()]);
            page.rect(x, y, w, 16.0, true);
            x += w;
        }
        y += 30.0;
        for (i, position) in report.positions.iter().take(MAX_TABLE_ROWS).enumerate() {
            let x = MARGIN + (i % 6) as f64 * (content_width / 6.0);
            let row_y = y + (i / 6) as f64 * 14.0;
            page.fill_color(PALETTE[i % PALETTE.len()]);
            page.rect(x, row_y - 7.0, 7.0, 7.0, true);
            page.fill_color(black);
            page.text(
                x + 10.0,
                row_y,
                8.0,
                false,
                &format!(
                    "{} {:.1}%",
                    position.ticker,
                    position.position_value / report.total_value * 100.0
                ),
            );
        }
        y += 28.0;
    } else {
        y += 14.0;
    }

    // Value trend
    y += 16.0;
    page.fill_color(black);
    page.text(
        MARGIN,
        y,
        12.0,
        true,
        &format!("{}-Day Value Trend", report.history.len()),
    );
    y += 10.0;
    let chart_height = 140.0;
    page.stroke_color((0.8, 0.8, 0.8));
    page.rect(MARGIN, y, content_width, chart_height, false);
    if report.history.len() >= 2 {
        let min = report.history.iter().copied().fold(f64::INFINITY, f64::min);
        let max = report.history.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = if max > min { max - min } else { 1.0 };
        let step = content_width / (report.history.len() - 1) as f64;
        let points: Vec<(f64, f64)> = report
            .history
            .iter()
            .enumerate()
            .map(|(i, v)| {
                (
                    MARGIN + step * i as f64,
                    y + chart_height - 8.0 - (v - min) / span * (chart_height - 16.0),
                )
            })
            .collect();
        page.stroke_color(PALETTE[0]);
        page.polyline(&points, 1.5);
        page.fill_color(grey);
        page.text(MARGIN + 4.0, y + 12.0, 8.0, false, &money(max));
        page.text(MARGIN + 4.0, y + chart_height - 4.0, 8.0, false, &money(min));
    }
    y += chart_height + 30.0;

    // Key metrics
    page.fill_color(black);
    page.text(MARGIN, y, 12.0, true, "Key Metrics");
    y += 20.0;
    let metrics = [
        ("Sharpe Ratio", format!("{:.2}", report.metrics.sharpe)),
        ("Volatility", format!("{:.2}%", report.metrics.volatility)),
        ("Beta", format!("{:.2}", report.metrics.beta)),
        ("Max Drawdown", format!("{:.2}%", report.metrics.max_drawdown)),
    ];
    let column = content_width / metrics.len() as f64;
    for (i, (label, value)) in metrics.iter().enumerate() {
        let x = MARGIN + column * i as f64;
        page.fill_color(grey);
        page.text(x, y, 9.0, false, label);
        page.fill_color(black);
        page.text(x, y + 18.0, 13.0, true, value);
    }
}

/// Wrap a content stream into a complete document with its xref table
fn assemble(content: &str) -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body);
    }

    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    );

    out.into_bytes()
}
