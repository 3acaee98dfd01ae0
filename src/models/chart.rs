//! 图表描述

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    #[serde(default)]
    pub name: String,
    pub values: Vec<f64>,
}

/// 模型给出的图表描述，由图表渲染器转成图片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type", alias = "chart_type")]
    pub chart_type: ChartType,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
}

impl ChartSpec {
    /// 检查描述是否可以渲染
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.categories.is_empty() {
            return Err(invalid("categories 不能为空"));
        }
        if self.series.is_empty() {
            return Err(invalid("至少需要一个 series"));
        }
        for series in &self.series {
            if series.values.len() != self.categories.len() {
                return Err(invalid(&format!(
                    "series '{}' 有 {} 个值，categories 有 {} 个",
                    series.name,
                    series.values.len(),
                    self.categories.len()
                )));
            }
            if series.values.iter().any(|v| !v.is_finite()) {
                return Err(invalid(&format!("series '{}' 含有非有限数值", series.name)));
            }
        }
        Ok(())
    }

    /// 所有数值的 (最小值, 最大值)，并且总是包含 0
    pub fn value_range(&self) -> (f64, f64) {
        self.series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)))
    }
}

fn invalid(reason: &str) -> FlowError {
    FlowError::InvalidChartSpec {
        reason: reason.to_string(),
    }
}
