//! Burn-plan wire types and the client-side operations built on them.
//!
//! The request types are shared with the proxy handlers. The derivations at
//! the bottom (chart series, rescaling, relative times) only read a plan.

use bill_burner_agent_runtime::Amount;
use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::api_client::{ApiClient, ApiError};

pub const DEFAULT_RECENT_LIMIT: usize = 5;
const MAX_TIMELINE_POINTS: u32 = 60;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Serverless,
    Kubernetes,
    Traditional,
    Mixed,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Serverless => "serverless",
            Architecture::Kubernetes => "kubernetes",
            Architecture::Traditional => "traditional",
            Architecture::Mixed => "mixed",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BurningStyle {
    Horizontal,
    Vertical,
}

impl BurningStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BurningStyle::Horizontal => "horizontal",
            BurningStyle::Vertical => "vertical",
        }
    }
}

/// What the user dialed in before hitting the burn button.
#[derive(Debug, Clone, PartialEq)]
pub struct BurnConfig {
    pub total_amount: f64,
    pub timeline: u32,
    pub architecture: Architecture,
    pub burning_style: BurningStyle,
    /// 1 (mildly dumb) ..= 10 (brain damage).
    pub efficiency_level: u8,
}

pub fn stupidity_label(efficiency_level: u8) -> &'static str {
    match efficiency_level {
        1 | 2 => "Mildly dumb",
        3..=5 => "Moderately stupid",
        6..=8 => "Very stupid",
        9 | 10 => "Brain damage",
        _ => "Moderately stupid",
    }
}

impl BurnConfig {
    pub fn to_request(&self) -> BurnPlanRequest {
        BurnPlanRequest {
            amount: Some(Amount::Text(format!("${}", Amount::Number(self.total_amount)))),
            timeline: Some(self.timeline),
            stupidity: Some(stupidity_label(self.efficiency_level).to_string()),
            architecture: Some(self.architecture.as_str().to_string()),
            burning_style: Some(self.burning_style.as_str().to_string()),
            model_id: None,
        }
    }
}

/// Body of `POST /burn-plan`. Every field is optional on the wire so the
/// handler can report missing ones itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct BurnPlanRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Amount>,
    #[serde(
        default,
        deserialize_with = "lenient_days",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeline: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stupidity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burning_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl BurnPlanRequest {
    /// Accepts the flat body as well as the `{"config": {..}}` wrapper.
    pub fn from_body(body: Value) -> Result<Self, serde_json::Error> {
        match body {
            Value::Object(mut map) if map.get("config").map_or(false, Value::is_object) => {
                serde_json::from_value(map.remove("config").unwrap_or_default())
            }
            other => serde_json::from_value(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(untagged)]
pub enum DurationUsed {
    Days(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct ServiceDeployment {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit_cost: f64,
    pub total_cost: f64,
    #[serde(default)]
    pub start_day: i64,
    /// `-1` means the service ran until the end of the timeline.
    #[serde(default = "end_of_timeline")]
    pub end_day: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub duration_used: Option<DurationUsed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_pattern: Option<String>,
    /// A percentage string or a bare multiplier, depending on the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub waste_factor: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roast: Option<String>,
}

fn default_quantity() -> f64 {
    1.0
}

fn end_of_timeline() -> i64 {
    -1
}

/// Day counts arrive as integers, whole floats (`30.0`) or numeric strings
/// (`"30"`). An empty string reads as absent.
fn lenient_days<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let whole = |days: f64| -> Result<u32, D::Error> {
        if days.is_finite() && days.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&days) {
            Ok(days as u32)
        } else {
            Err(D::Error::custom(format!("timeline must be a whole number of days, got {days}")))
        }
    };
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match number.as_u64() {
            Some(days) => u32::try_from(days)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("timeline out of range: {days}"))),
            None => whole(number.as_f64().unwrap_or(f64::NAN)).map(Some),
        },
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => {
            let days = text
                .trim()
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("timeline is not a number: {text:?}")))?;
            whole(days).map(Some)
        }
        Some(other) => Err(D::Error::custom(format!(
            "timeline must be a number of days, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct PdfInvoice {
    pub url: String,
    pub s3_key: String,
    pub bucket: String,
    pub expiration_seconds: u64,
    pub upload_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct BurnPlanAnalysis {
    pub total_amount: String,
    pub timeline_days: u32,
    pub efficiency_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burning_style: Option<String>,
    #[serde(default)]
    pub services_deployed: Vec<ServiceDeployment>,
    pub total_calculated_cost: f64,
    #[serde(default)]
    pub deployment_scenario: String,
    #[serde(default)]
    pub key_mistakes: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub roast: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_invoice: Option<PdfInvoice>,
}

impl BurnPlanAnalysis {
    /// Reads an analysis out of an agent response, unwrapping `{"analysis": ..}`.
    pub fn from_agent_response(value: &Value) -> Option<Self> {
        let candidate = value.get("analysis").unwrap_or(value);
        serde_json::from_value(candidate.clone()).ok()
    }

    /// Whether the agent's total lands within `tolerance` (0.10 = 10%) of the
    /// requested amount. `None` when the requested amount has no number in it.
    pub fn cost_within(&self, tolerance: f64) -> Option<bool> {
        let requested = parse_amount(&self.total_amount)?;
        let lower = requested * (1.0 - tolerance);
        let upper = requested * (1.0 + tolerance);
        Some((lower..=upper).contains(&self.total_calculated_cost))
    }
}

/// Success envelope returned by `POST /burn-plan`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct BurnPlanEnvelope {
    pub status: String,
    #[schema(value_type = Object)]
    pub analysis: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct RecentBurnPlanSummary {
    pub total_amount: String,
    pub timeline_days: u32,
    pub efficiency_level: String,
    pub deployment_scenario: String,
    pub total_calculated_cost: f64,
}

impl From<&BurnPlanAnalysis> for RecentBurnPlanSummary {
    fn from(plan: &BurnPlanAnalysis) -> Self {
        Self {
            total_amount: plan.total_amount.clone(),
            timeline_days: plan.timeline_days,
            efficiency_level: plan.efficiency_level.clone(),
            deployment_scenario: plan.deployment_scenario.clone(),
            total_calculated_cost: plan.total_calculated_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct RecentBurnPlan {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub burn_plan: RecentBurnPlanSummary,
}

pub async fn create_burn_plan(
    api: &ApiClient,
    config: &BurnConfig,
) -> Result<BurnPlanAnalysis, ApiError> {
    let body = json!({ "config": config.to_request() });
    tracing::info!(
        amount = config.total_amount,
        timeline = config.timeline,
        architecture = config.architecture.as_str(),
        "creating burn plan"
    );
    let envelope: BurnPlanEnvelope = api
        .post("/burn-plan", &body)
        .await?
        .ok_or_else(|| ApiError::Decode("empty burn plan response".to_string()))?;
    BurnPlanAnalysis::from_agent_response(&envelope.analysis)
        .ok_or_else(|| ApiError::Decode("analysis is not a burn plan".to_string()))
}

pub async fn fetch_recent_plans(
    api: &ApiClient,
    limit: usize,
) -> Result<Vec<RecentBurnPlan>, ApiError> {
    let plans = api
        .get(&format!("/burn-plan/recent?limit={limit}"))
        .await?;
    Ok(plans.unwrap_or_default())
}

pub fn format_time_ago(timestamp_ms: i64, now_ms: i64) -> String {
    let seconds = now_ms.saturating_sub(timestamp_ms).max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    if days > 0 {
        format!("{days}d ago")
    } else if hours > 0 {
        format!("{hours}h ago")
    } else if minutes > 0 {
        format!("{minutes}m ago")
    } else {
        "just now".to_string()
    }
}

/// First number in an amount string: `"$1,250.50"` -> `1250.5`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut number = String::new();
    let mut seen_dot = false;
    for c in text[start..].chars() {
        match c {
            '0'..='9' => number.push(c),
            ',' => {}
            '.' if !seen_dot => {
                seen_dot = true;
                number.push(c);
            }
            _ => break,
        }
    }
    number.trim_end_matches('.').parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineSeries {
    pub timestamps: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub racing_bar: Vec<ChartPoint>,
    pub pie: Vec<ChartPoint>,
    pub timeline: TimelineSeries,
    pub total_cost: f64,
    pub timeline_days: u32,
}

pub fn service_category(service_name: &str) -> &'static str {
    match service_name {
        "EC2" | "EKS" | "Lambda" | "Fargate" => "Compute",
        "RDS" | "DynamoDB" | "Aurora" => "Database",
        "S3" | "EBS" | "EFS" => "Storage",
        "CloudFront" | "API Gateway" | "NAT Gateway" | "ALB" => "Networking",
        "SageMaker" | "Bedrock" => "ML/AI",
        _ => "Other",
    }
}

pub fn chart_data(plan: &BurnPlanAnalysis) -> ChartData {
    let mut racing_bar: Vec<ChartPoint> = plan
        .services_deployed
        .iter()
        .map(|service| ChartPoint {
            name: match &service.instance_type {
                Some(instance) if !instance.is_empty() => {
                    format!("{} {}", service.service_name, instance)
                }
                _ => service.service_name.clone(),
            },
            value: service.total_cost,
        })
        .collect();
    racing_bar.sort_by(|a, b| b.value.total_cmp(&a.value));

    let mut pie: Vec<ChartPoint> = Vec::new();
    for service in &plan.services_deployed {
        let category = service_category(&service.service_name);
        match pie.iter_mut().find(|point| point.name == category) {
            Some(point) => point.value += service.total_cost,
            None => pie.push(ChartPoint {
                name: category.to_string(),
                value: service.total_cost,
            }),
        }
    }

    ChartData {
        racing_bar,
        pie,
        timeline: timeline_series(plan),
        total_cost: plan.total_calculated_cost,
        timeline_days: plan.timeline_days,
    }
}

/// Cumulative spend sampled at up to 60 evenly spaced days. Each service's
/// cost accrues linearly between its start and end day and stays counted
/// once the service is gone.
fn timeline_series(plan: &BurnPlanAnalysis) -> TimelineSeries {
    let days = i64::from(plan.timeline_days);
    let points = days.min(i64::from(MAX_TIMELINE_POINTS));

    let mut series = TimelineSeries::default();
    for i in 0..=points {
        let day = if points == 0 { 0 } else { i * days / points };
        series.timestamps.push(format!("Day {day}"));
        let cumulative: f64 = plan
            .services_deployed
            .iter()
            .map(|service| accrued_cost(service, day, days))
            .sum();
        series.values.push(cumulative);
    }
    series
}

fn accrued_cost(service: &ServiceDeployment, day: i64, timeline_days: i64) -> f64 {
    let start = service.start_day.max(0);
    let end = if service.end_day < 0 {
        timeline_days
    } else {
        service.end_day
    };
    if day < start {
        return 0.0;
    }
    let duration = end - start;
    if duration <= 0 {
        return service.total_cost;
    }
    let active = (day.min(end) - start) as f64;
    service.total_cost * (active / duration as f64)
}

/// Rescales every cost in `plan` to a new total. `None` when the plan's
/// own amount cannot be read as a positive number.
pub fn scale_burn_plan(plan: &BurnPlanAnalysis, new_amount: f64) -> Option<BurnPlanAnalysis> {
    let original = parse_amount(&plan.total_amount).filter(|amount| *amount > 0.0)?;
    let factor = new_amount / original;
    let mut scaled = plan.clone();
    scaled.total_amount = format!("${}", Amount::Number(new_amount));
    for service in &mut scaled.services_deployed {
        service.total_cost *= factor;
    }
    scaled.total_calculated_cost *= factor;
    Some(scaled)
}
