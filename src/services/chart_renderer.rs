//! 图表渲染服务
//!
//! 把模型给出的 `ChartSpec` 画成 SVG，再在无头浏览器里截图得到 PNG。
//! 渲染失败直接报错，不会用占位图代替。

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::browser::BrowserSession;
use crate::error::{AppError, AppResult};
use crate::infrastructure::JsExecutor;
use crate::models::{ChartSpec, ChartType};

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 500;

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;
const Y_TICKS: usize = 5;

const PALETTE: [&str; 6] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948",
];

/// 图表渲染能力
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// 返回 PNG 字节
    async fn render(&self, spec: &ChartSpec) -> AppResult<Vec<u8>>;
}

/// 在共享浏览器中截图的渲染器
pub struct BrowserChartRenderer {
    session: Arc<BrowserSession>,
}

impl BrowserChartRenderer {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ChartRenderer for BrowserChartRenderer {
    async fn render(&self, spec: &ChartSpec) -> AppResult<Vec<u8>> {
        spec.validate()?;

        let svg = build_svg(spec, CHART_WIDTH, CHART_HEIGHT);
        let html = format!(
            "<!DOCTYPE html><html><body style=\"margin:0;background:#fff\">\
             <div id=\"chart\" style=\"display:inline-block\">{svg}</div></body></html>"
        );

        let page = self.session.new_page().await?;
        let executor = JsExecutor::new(page);
        let result = async {
            executor.set_html(&html).await?;
            executor.screenshot_element("#chart").await
        }
        .await;
        executor.close().await;

        let png = result.map_err(|e| AppError::chart_render_failed(e.to_string()))?;
        if png.is_empty() {
            return Err(AppError::chart_render_failed("截图为空"));
        }

        info!("📊 图表渲染完成 ({} 字节)", png.len());
        Ok(png)
    }
}

/// 生成图表的 SVG 文档
///
/// 调用前应先通过 [`ChartSpec::validate`]。
pub fn build_svg(spec: &ChartSpec, width: u32, height: u32) -> String {
    let (w, h) = (f64::from(width), f64::from(height));
    let plot_w = w - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = h - MARGIN_TOP - MARGIN_BOTTOM;

    let (lo, mut hi) = spec.value_range();
    if (hi - lo).abs() < f64::EPSILON {
        hi = lo + 1.0;
    }
    let y_of = |v: f64| MARGIN_TOP + plot_h * (hi - v) / (hi - lo);
    let baseline = y_of(0.0);

    let n = spec.categories.len().max(1) as f64;
    let band = plot_w / n;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif" font-size="12">"#
    );
    let _ = write!(svg, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##);

    if let Some(title) = &spec.title {
        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="28" text-anchor="middle" font-size="18">{}</text>"#,
            w / 2.0,
            escape_xml(title)
        );
    }

    // 纵轴刻度与网格
    for i in 0..=Y_TICKS {
        let value = lo + (hi - lo) * i as f64 / Y_TICKS as f64;
        let y = y_of(value);
        let _ = write!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#e0e0e0"/><text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"##,
            MARGIN_LEFT + plot_w,
            MARGIN_LEFT - 6.0,
            y + 4.0,
            format_tick(value)
        );
    }

    match spec.chart_type {
        ChartType::Bar => {
            let series_count = spec.series.len() as f64;
            let bar_w = band * 0.8 / series_count;
            for (s_idx, series) in spec.series.iter().enumerate() {
                let color = PALETTE[s_idx % PALETTE.len()];
                for (c_idx, value) in series.values.iter().enumerate() {
                    let x = MARGIN_LEFT + band * c_idx as f64 + band * 0.1 + bar_w * s_idx as f64;
                    let y = y_of(*value);
                    let (top, bar_h) = if y < baseline {
                        (y, baseline - y)
                    } else {
                        (baseline, y - baseline)
                    };
                    let _ = write!(
                        svg,
                        r#"<rect x="{x:.1}" y="{top:.1}" width="{bar_w:.1}" height="{bar_h:.1}" fill="{color}"/>"#
                    );
                }
            }
        }
        ChartType::Line => {
            for (s_idx, series) in spec.series.iter().enumerate() {
                let color = PALETTE[s_idx % PALETTE.len()];
                let points: Vec<String> = series
                    .values
                    .iter()
                    .enumerate()
                    .map(|(c_idx, v)| {
                        format!(
                            "{:.1},{:.1}",
                            MARGIN_LEFT + band * (c_idx as f64 + 0.5),
                            y_of(*v)
                        )
                    })
                    .collect();
                let _ = write!(
                    svg,
                    r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="2"/>"#,
                    points.join(" ")
                );
                for point in &points {
                    if let Some((x, y)) = point.split_once(',') {
                        let _ = write!(
                            svg,
                            r#"<circle cx="{x}" cy="{y}" r="3" fill="{color}"/>"#
                        );
                    }
                }
            }
        }
    }

    // 坐标轴
    let _ = write!(
        svg,
        r##"<line x1="{MARGIN_LEFT}" y1="{baseline:.1}" x2="{:.1}" y2="{baseline:.1}" stroke="#333"/><line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{:.1}" stroke="#333"/>"##,
        MARGIN_LEFT + plot_w,
        MARGIN_TOP + plot_h
    );

    for (c_idx, category) in spec.categories.iter().enumerate() {
        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            MARGIN_LEFT + band * (c_idx as f64 + 0.5),
            MARGIN_TOP + plot_h + 18.0,
            escape_xml(category)
        );
    }

    if let Some(label) = &spec.x_label {
        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="14">{}</text>"#,
            MARGIN_LEFT + plot_w / 2.0,
            h - 20.0,
            escape_xml(label)
        );
    }
    if let Some(label) = &spec.y_label {
        let cy = MARGIN_TOP + plot_h / 2.0;
        let _ = write!(
            svg,
            r#"<text x="18" y="{cy:.1}" text-anchor="middle" font-size="14" transform="rotate(-90 18 {cy:.1})">{}</text>"#,
            escape_xml(label)
        );
    }

    // 图例
    let named: Vec<_> = spec.series.iter().filter(|s| !s.name.is_empty()).collect();
    if !named.is_empty() {
        for (s_idx, series) in spec.series.iter().enumerate() {
            let y = MARGIN_TOP + 16.0 * s_idx as f64;
            let x = MARGIN_LEFT + plot_w - 120.0;
            let _ = write!(
                svg,
                r#"<rect x="{x:.1}" y="{:.1}" width="10" height="10" fill="{}"/><text x="{:.1}" y="{y:.1}">{}</text>"#,
                y - 9.0,
                PALETTE[s_idx % PALETTE.len()],
                x + 14.0,
                escape_xml(&series.name)
            );
        }
    }

    svg.push_str("</svg>");
    debug!("SVG 生成完成: {} 字节", svg.len());
    svg
}

fn format_tick(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
