use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum, error::ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::{
    CapitalLumpSumRequest, CapitalLumpSumResult, ContributionSchedule, EngineConfig, EngineError,
    EngineResult, IncomeLevel, PayoutKind, ProjectionStrategy, Report, Sex, SimulationParams,
    TaxRate, calculate_capital_lump_sum, compute_capital_at_start, compute_from_contribution,
    solve_for_target_capital, solve_for_target_payment,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliScenario {
    CapitalAtStart,
    FromContribution,
    TargetPayout,
    TargetCapital,
    LumpSum,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSex {
    Male,
    Female,
}

impl From<CliSex> for Sex {
    fn from(value: CliSex) -> Self {
        match value {
            CliSex::Male => Sex::Male,
            CliSex::Female => Sex::Female,
        }
    }
}

impl From<Sex> for CliSex {
    fn from(value: Sex) -> Self {
        match value {
            Sex::Male => CliSex::Male,
            Sex::Female => CliSex::Female,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliPayoutKind {
    Lifetime,
    TenYear,
}

impl From<CliPayoutKind> for PayoutKind {
    fn from(value: CliPayoutKind) -> Self {
        match value {
            CliPayoutKind::Lifetime => PayoutKind::Lifetime,
            CliPayoutKind::TenYear => PayoutKind::TenYear,
        }
    }
}

impl From<PayoutKind> for CliPayoutKind {
    fn from(value: PayoutKind) -> Self {
        match value {
            PayoutKind::Lifetime => CliPayoutKind::Lifetime,
            PayoutKind::TenYear => CliPayoutKind::TenYear,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStrategy {
    Simulated,
    ClosedForm,
}

impl From<CliStrategy> for ProjectionStrategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::Simulated => ProjectionStrategy::Simulated,
            CliStrategy::ClosedForm => ProjectionStrategy::ClosedForm,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiScenario {
    #[serde(alias = "capitalAtStart", alias = "capital_at_start")]
    CapitalAtStart,
    #[serde(alias = "fromContribution", alias = "from_contribution")]
    FromContribution,
    #[serde(alias = "targetPayout", alias = "target_payout")]
    TargetPayout,
    #[serde(alias = "targetCapital", alias = "target_capital")]
    TargetCapital,
    #[serde(alias = "lumpSum", alias = "lump_sum")]
    LumpSum,
}

impl From<ApiScenario> for CliScenario {
    fn from(value: ApiScenario) -> Self {
        match value {
            ApiScenario::CapitalAtStart => CliScenario::CapitalAtStart,
            ApiScenario::FromContribution => CliScenario::FromContribution,
            ApiScenario::TargetPayout => CliScenario::TargetPayout,
            ApiScenario::TargetCapital => CliScenario::TargetCapital,
            ApiScenario::LumpSum => CliScenario::LumpSum,
        }
    }
}

/// Web payload shared by every endpoint. Missing fields keep the defaults
/// of [`default_cli_for_api`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalcPayload {
    scenario: Option<ApiScenario>,

    sex: Option<Sex>,
    current_age: Option<u32>,
    horizon_years: Option<u32>,
    monthly_contribution: Option<f64>,
    annual_contribution: Option<f64>,
    income_monthly: Option<f64>,
    income_level: Option<String>,
    tax_rate: Option<f64>,
    reinvest_tax_deduction: Option<bool>,
    starting_capital: Option<f64>,
    external_transfer_in: Option<f64>,
    annual_return: Option<f64>,
    used_other_deduction_limit_by_year: Option<BTreeMap<u32, f64>>,
    /// Query-string form of the map above: `YEAR=AMOUNT` pairs separated by
    /// commas, e.g. `usedOther=1=50000,3=120000`.
    used_other: Option<String>,

    target_payment: Option<f64>,
    payout_kind: Option<PayoutKind>,
    target_capital: Option<f64>,
    target_sum: Option<f64>,

    include_yearly: Option<bool>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pds-calc calc",
    about = "PDS long-term savings calculator (accumulation, co-funding, tax refunds, payouts)"
)]
struct Cli {
    #[arg(long, value_enum, default_value_t = CliScenario::CapitalAtStart)]
    scenario: CliScenario,
    #[arg(long, help = "JSON engine config; missing fields keep defaults")]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = CliSex::Male)]
    sex: CliSex,
    #[arg(long, default_value_t = 45)]
    current_age: u32,
    #[arg(long, default_value_t = 15, help = "Years until payouts start")]
    horizon_years: u32,
    #[arg(long, conflicts_with = "annual_contribution")]
    monthly_contribution: Option<f64>,
    #[arg(long)]
    annual_contribution: Option<f64>,
    #[arg(long, default_value_t = 100_000.0, help = "Average monthly income")]
    income_monthly: f64,
    #[arg(
        long,
        help = "Named co-funding tier (low, mid, high); overrides --income-monthly"
    )]
    income_level: Option<String>,
    #[arg(long, default_value_t = 13.0, help = "Income tax rate in percent: 13, 15, 18, 20 or 22")]
    tax_rate: f64,
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    reinvest_tax: bool,
    #[arg(long, default_value_t = 0.0)]
    starting_capital: f64,
    #[arg(long, default_value_t = 0.0, help = "Pension savings transferred in at the start")]
    external_transfer: f64,
    #[arg(
        long,
        help = "Expected annual return in percent, e.g. 10; defaults to the config value"
    )]
    annual_return: Option<f64>,
    #[arg(
        long = "used-other",
        value_parser = parse_used_other,
        help = "Deduction base used elsewhere in a year, as YEAR=AMOUNT; repeatable"
    )]
    used_other: Vec<(u32, f64)>,
    #[arg(long, help = "Desired monthly payout for --scenario target-payout")]
    target_payment: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliPayoutKind::Lifetime)]
    payout_kind: CliPayoutKind,
    #[arg(long, help = "Desired final capital for --scenario target-capital")]
    target_capital: Option<f64>,
    #[arg(long, help = "Desired capital for --scenario lump-sum")]
    target_sum: Option<f64>,
    #[arg(long, value_enum, help = "Projection strategy used by the solver")]
    strategy: Option<CliStrategy>,
    #[arg(long, help = "Solver iteration cap")]
    max_iterations: Option<u32>,
    #[arg(long, help = "Include the per-year trace in the output")]
    yearly: bool,
}

fn parse_used_other(raw: &str) -> Result<(u32, f64), String> {
    let (year, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected YEAR=AMOUNT, got {raw}"))?;
    let year = year
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid year in {raw}: {e}"))?;
    let amount = amount
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid amount in {raw}: {e}"))?;
    Ok((year, amount))
}

#[derive(Debug, Clone, PartialEq)]
enum Scenario {
    CapitalAtStart,
    FromContribution,
    TargetPayout { amount: f64, kind: PayoutKind },
    TargetCapital { amount: f64 },
    LumpSum(CapitalLumpSumRequest),
}

#[derive(Debug, Clone, PartialEq)]
struct CalcRequest {
    scenario: Scenario,
    params: SimulationParams,
    include_yearly: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CalcResponse {
    Report(Report),
    LumpSum(CapitalLumpSumResult),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn tax_rate_from_percent(percent: f64) -> EngineResult<TaxRate> {
    TaxRate::from_fraction(percent / 100.0)
}

fn build_params(cli: &Cli, config: &EngineConfig) -> EngineResult<SimulationParams> {
    let contribution = match (cli.monthly_contribution, cli.annual_contribution) {
        (Some(_), Some(_)) => {
            return Err(EngineError::validation(
                "contribution",
                "--monthly-contribution and --annual-contribution are mutually exclusive",
            ));
        }
        (Some(monthly), None) => ContributionSchedule::Monthly(monthly),
        (None, Some(annual)) => ContributionSchedule::Annual(annual),
        (None, None) => ContributionSchedule::default(),
    };

    let annual_return = cli
        .annual_return
        .map_or(config.default_annual_return, |percent| percent / 100.0);

    Ok(SimulationParams {
        sex: cli.sex.into(),
        current_age: cli.current_age,
        horizon_years: cli.horizon_years,
        contribution,
        income_monthly: cli.income_monthly,
        // The lump-sum scenario resolves its own tier key.
        income_level: match cli.scenario {
            CliScenario::LumpSum => None,
            _ => cli.income_level.as_deref().map(IncomeLevel::resolve),
        },
        tax_rate: tax_rate_from_percent(cli.tax_rate)?,
        reinvest_tax_deduction: cli.reinvest_tax,
        starting_capital: cli.starting_capital,
        external_transfer_in: cli.external_transfer,
        annual_return,
        used_other_deduction_limit_by_year: cli.used_other.iter().copied().collect(),
    })
}

fn build_request(cli: &Cli, config: &EngineConfig) -> EngineResult<CalcRequest> {
    let params = build_params(cli, config)?;
    let scenario = match cli.scenario {
        CliScenario::CapitalAtStart => Scenario::CapitalAtStart,
        CliScenario::FromContribution => Scenario::FromContribution,
        CliScenario::TargetPayout => Scenario::TargetPayout {
            amount: required(cli.target_payment, "targetPayment", "target-payout")?,
            kind: cli.payout_kind.into(),
        },
        CliScenario::TargetCapital => Scenario::TargetCapital {
            amount: required(cli.target_capital, "targetCapital", "target-capital")?,
        },
        CliScenario::LumpSum => Scenario::LumpSum(CapitalLumpSumRequest {
            target_sum: required(cli.target_sum, "targetSum", "lump-sum")?,
            income_level: cli
                .income_level
                .clone()
                .unwrap_or_else(|| "high".to_string()),
            tax_rate: params.tax_rate,
            reinvest: params.reinvest_tax_deduction,
        }),
    };
    Ok(CalcRequest {
        scenario,
        params,
        include_yearly: cli.yearly,
    })
}

fn required(value: Option<f64>, field: &'static str, scenario: &str) -> EngineResult<f64> {
    value.ok_or_else(|| EngineError::validation(field, format!("is required for {scenario}")))
}

/// Engine config with the per-run CLI overrides applied.
fn effective_config(cli: &Cli) -> EngineResult<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(strategy) = cli.strategy {
        config.solver.strategy = strategy.into();
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.solver.max_iterations = max_iterations;
    }
    config.validate()?;
    Ok(config)
}

fn execute(request: &CalcRequest, config: &EngineConfig) -> EngineResult<CalcResponse> {
    let params = &request.params;
    let report = match &request.scenario {
        Scenario::CapitalAtStart => compute_capital_at_start(params, config)?,
        Scenario::FromContribution => compute_from_contribution(params, config)?,
        Scenario::TargetPayout { amount, kind } => {
            solve_for_target_payment(params, *amount, *kind, config)?
        }
        Scenario::TargetCapital { amount } => solve_for_target_capital(params, *amount, config)?,
        Scenario::LumpSum(lump_sum) => {
            return Ok(CalcResponse::LumpSum(calculate_capital_lump_sum(
                lump_sum, config,
            )?));
        }
    };
    let report = if request.include_yearly {
        report
    } else {
        Report {
            yearly: Vec::new(),
            ..report
        }
    };
    Ok(CalcResponse::Report(report))
}

/// Runs one calculation from command-line arguments (program name first)
/// and returns the pretty-printed JSON result.
pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let rendered = err.render().to_string();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Ok(rendered),
                _ => Err(rendered),
            };
        }
    };
    let config = effective_config(&cli).map_err(|e| e.to_string())?;
    let request = build_request(&cli, &config).map_err(|e| e.to_string())?;
    let response = execute(&request, &config).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to encode result: {e}"))
}

type SharedConfig = Arc<EngineConfig>;

fn router(config: EngineConfig) -> Router {
    Router::new()
        .route(
            "/api/calculate",
            get(calculate_get_handler).post(calculate_post_handler),
        )
        .route("/api/solve", post(solve_handler))
        .route(
            "/api/lump-sum",
            get(lump_sum_get_handler).post(lump_sum_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(Arc::new(config))
}

pub async fn run_http_server(port: u16, config: EngineConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(config);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "PDS HTTP API listening");
    tracing::info!("Local access: http://127.0.0.1:{port}/api/calculate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_get_handler(
    State(config): State<SharedConfig>,
    Query(payload): Query<CalcPayload>,
) -> Response {
    calculate_handler_impl(&config, payload)
}

async fn calculate_post_handler(
    State(config): State<SharedConfig>,
    Json(payload): Json<CalcPayload>,
) -> Response {
    calculate_handler_impl(&config, payload)
}

fn calculate_handler_impl(config: &EngineConfig, payload: CalcPayload) -> Response {
    respond(config, api_request_from_payload(payload, CliScenario::CapitalAtStart, config))
}

async fn solve_handler(
    State(config): State<SharedConfig>,
    Json(payload): Json<CalcPayload>,
) -> Response {
    let default_scenario = if payload.target_capital.is_some() {
        CliScenario::TargetCapital
    } else {
        CliScenario::TargetPayout
    };
    let request = api_request_from_payload(payload, default_scenario, &config).and_then(|request| {
        if matches!(
            request.scenario,
            Scenario::TargetPayout { .. } | Scenario::TargetCapital { .. }
        ) {
            Ok(request)
        } else {
            Err(EngineError::validation(
                "scenario",
                "/api/solve only runs target-payout or target-capital",
            ))
        }
    });
    respond(&config, request)
}

async fn lump_sum_get_handler(
    State(config): State<SharedConfig>,
    Query(payload): Query<CalcPayload>,
) -> Response {
    lump_sum_handler_impl(&config, payload)
}

async fn lump_sum_post_handler(
    State(config): State<SharedConfig>,
    Json(payload): Json<CalcPayload>,
) -> Response {
    lump_sum_handler_impl(&config, payload)
}

fn lump_sum_handler_impl(config: &EngineConfig, mut payload: CalcPayload) -> Response {
    payload.scenario = Some(ApiScenario::LumpSum);
    respond(config, api_request_from_payload(payload, CliScenario::LumpSum, config))
}

fn respond(config: &EngineConfig, request: EngineResult<CalcRequest>) -> Response {
    match request.and_then(|request| execute(&request, config)) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => engine_error_response(&err),
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
        EngineError::UnreachableTarget { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error_response(err: &EngineError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, "Request rejected");
    }
    error_response(status, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(
    json: &str,
    default_scenario: CliScenario,
) -> Result<CalcRequest, String> {
    let payload = serde_json::from_str::<CalcPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload, default_scenario, &EngineConfig::default())
        .map_err(|e| e.to_string())
}

fn api_request_from_payload(
    payload: CalcPayload,
    default_scenario: CliScenario,
    config: &EngineConfig,
) -> EngineResult<CalcRequest> {
    let mut cli = default_cli_for_api();
    cli.scenario = payload.scenario.map_or(default_scenario, Into::into);

    if let Some(v) = payload.sex {
        cli.sex = v.into();
    }
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.horizon_years {
        cli.horizon_years = v;
    }

    if payload.monthly_contribution.is_some() || payload.annual_contribution.is_some() {
        cli.monthly_contribution = payload.monthly_contribution;
        cli.annual_contribution = payload.annual_contribution;
    }
    if let Some(v) = payload.income_monthly {
        cli.income_monthly = v;
    }
    if payload.income_level.is_some() {
        cli.income_level = payload.income_level;
    }
    if let Some(v) = payload.tax_rate {
        // Accept both 0.13 and 13.
        cli.tax_rate = if v <= 1.0 { v * 100.0 } else { v };
    }
    if let Some(v) = payload.reinvest_tax_deduction {
        cli.reinvest_tax = v;
    }
    if let Some(v) = payload.starting_capital {
        cli.starting_capital = v;
    }
    if let Some(v) = payload.external_transfer_in {
        cli.external_transfer = v;
    }
    if payload.annual_return.is_some() {
        cli.annual_return = payload.annual_return;
    }
    if let Some(v) = payload.used_other_deduction_limit_by_year {
        cli.used_other = v.into_iter().collect();
    }
    if let Some(raw) = payload.used_other.as_deref() {
        let pairs = raw
            .split(',')
            .filter(|pair| !pair.trim().is_empty())
            .map(parse_used_other)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::validation("usedOther", e))?;
        cli.used_other.extend(pairs);
    }

    cli.target_payment = payload.target_payment;
    if let Some(v) = payload.payout_kind {
        cli.payout_kind = v.into();
    }
    cli.target_capital = payload.target_capital;
    cli.target_sum = payload.target_sum;
    if let Some(v) = payload.include_yearly {
        cli.yearly = v;
    }

    build_request(&cli, config)
}

fn default_cli_for_api() -> Cli {
    Cli {
        scenario: CliScenario::CapitalAtStart,
        config: None,
        sex: CliSex::Male,
        current_age: 45,
        horizon_years: 15,
        monthly_contribution: Some(10_000.0),
        annual_contribution: None,
        income_monthly: 100_000.0,
        income_level: None,
        tax_rate: 13.0,
        reinvest_tax: true,
        starting_capital: 0.0,
        external_transfer: 0.0,
        annual_return: None,
        used_other: Vec::new(),
        target_payment: None,
        payout_kind: CliPayoutKind::Lifetime,
        target_capital: None,
        target_sum: None,
        strategy: None,
        max_iterations: None,
        yearly: false,
    }
}
