use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use eplus_ts::format::{fmt_compact, kpi_fmt};
use eplus_ts::ldc::series_ldc;
use eplus_ts::regression::period_totals;
use eplus_ts::units::{convert_points, convert_values, EnergyIp, EnergySi, PowerIp, TempSi};
use eplus_ts::{
    compute_degree_days, compute_load_balance, compute_stats, compute_tariff_cost,
    convert_unit_label, export_csv, fit_temperature_response, resample_series, unit_kind,
    AggregationMode, DegreeDayPeriod, ExplorerConfig, Frequency, LoadBalanceCategory,
    ResampleMode, ResponseMode, Series, UnitKind,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod archive;

use archive::{base_frequency, Archive};

#[derive(Parser, Debug)]
#[command(author, version, about = "EnergyPlus output time-series analysis CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the archive's data dictionary
    List(ListArgs),
    /// Resample and convert selected series, writing CSV
    Series(SeriesArgs),
    /// Descriptive statistics per selected series (JSON)
    Stats(SeriesArgs),
    /// Load-duration curve CSV for hourly series
    Ldc(LdcArgs),
    /// Energy and demand cost of selected meters
    Tariff(TariffArgs),
    /// Degree-day table and temperature-response fit
    DegreeDays(DegreeDayArgs),
    /// Monthly load balance over signed categories
    Balance(BalanceArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Archive dump JSON (`{"dictionary": [...], "data": {"<id>": [rows]}}`)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    archive: PathBuf,

    /// Optional viewer configuration JSON; flags override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Display in IP units
    #[arg(long, action = ArgAction::SetTrue)]
    ip: bool,

    /// SI energy unit
    #[arg(long, value_enum)]
    energy_si: Option<EnergySiOpt>,

    /// IP energy unit
    #[arg(long, value_enum)]
    energy_ip: Option<EnergyIpOpt>,

    /// IP power unit
    #[arg(long, value_enum)]
    power_ip: Option<PowerIpOpt>,

    /// SI temperature unit
    #[arg(long, value_enum)]
    temp_si: Option<TempSiOpt>,

    /// Output path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Only list meters
    #[arg(long, action = ArgAction::SetTrue)]
    meters: bool,
}

#[derive(Args, Debug)]
struct SeriesArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Dictionary ids (comma separated)
    #[arg(long, required = true, value_delimiter = ',')]
    ids: Vec<i64>,

    /// Target resolution
    #[arg(long, value_enum)]
    resample: Option<ResampleOpt>,

    /// Aggregation when resampling
    #[arg(long, value_enum)]
    aggregation: Option<AggregationOpt>,
}

#[derive(Args, Debug)]
struct LdcArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Dictionary ids (comma separated)
    #[arg(long, required = true, value_delimiter = ',')]
    ids: Vec<i64>,

    /// Express values as percent of peak
    #[arg(long, action = ArgAction::SetTrue)]
    normalize: bool,
}

#[derive(Args, Debug)]
struct TariffArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Meter ids (comma separated)
    #[arg(long, required = true, value_delimiter = ',')]
    ids: Vec<i64>,

    /// Electricity rate per kWh
    #[arg(long)]
    rate_elec: Option<f64>,

    /// District heating rate per kWh
    #[arg(long)]
    rate_dh: Option<f64>,

    /// District cooling rate per kWh
    #[arg(long)]
    rate_dc: Option<f64>,

    /// Demand rate per peak kW and month
    #[arg(long)]
    demand_rate: Option<f64>,
}

#[derive(Args, Debug)]
struct DegreeDayArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Outdoor temperature id
    #[arg(long)]
    temp: i64,

    /// Optional load id to regress against degree days
    #[arg(long)]
    load: Option<i64>,

    /// Base temperature in °C
    #[arg(long)]
    base_temp: Option<f64>,

    /// Bucket size
    #[arg(long, value_enum)]
    period: Option<PeriodOpt>,

    /// Degree-day terms in the regression
    #[arg(long, value_enum)]
    mode: Option<ResponseOpt>,
}

#[derive(Args, Debug)]
struct BalanceArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Category JSON (`[{"id", "label", "names", "sign"}]`)
    #[arg(long, value_hint = ValueHint::FilePath)]
    categories: PathBuf,
}

impl Command {
    fn common(&self) -> &CommonArgs {
        match self {
            Command::List(args) => &args.common,
            Command::Series(args) | Command::Stats(args) => &args.common,
            Command::Ldc(args) => &args.common,
            Command::Tariff(args) => &args.common,
            Command::DegreeDays(args) => &args.common,
            Command::Balance(args) => &args.common,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ResampleOpt {
    Original,
    Hourly,
    Monthly,
    Annual,
}

impl From<ResampleOpt> for ResampleMode {
    fn from(value: ResampleOpt) -> Self {
        match value {
            ResampleOpt::Original => ResampleMode::Original,
            ResampleOpt::Hourly => ResampleMode::Hourly,
            ResampleOpt::Monthly => ResampleMode::Monthly,
            ResampleOpt::Annual => ResampleMode::Annual,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AggregationOpt {
    Auto,
    Sum,
    Avg,
    Min,
    Max,
}

impl From<AggregationOpt> for AggregationMode {
    fn from(value: AggregationOpt) -> Self {
        match value {
            AggregationOpt::Auto => AggregationMode::Auto,
            AggregationOpt::Sum => AggregationMode::Sum,
            AggregationOpt::Avg => AggregationMode::Avg,
            AggregationOpt::Min => AggregationMode::Min,
            AggregationOpt::Max => AggregationMode::Max,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EnergySiOpt {
    J,
    Kwh,
    Mwh,
}

impl From<EnergySiOpt> for EnergySi {
    fn from(value: EnergySiOpt) -> Self {
        match value {
            EnergySiOpt::J => EnergySi::J,
            EnergySiOpt::Kwh => EnergySi::KWh,
            EnergySiOpt::Mwh => EnergySi::MWh,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EnergyIpOpt {
    Btu,
    Kbtu,
    Mmbtu,
}

impl From<EnergyIpOpt> for EnergyIp {
    fn from(value: EnergyIpOpt) -> Self {
        match value {
            EnergyIpOpt::Btu => EnergyIp::Btu,
            EnergyIpOpt::Kbtu => EnergyIp::KBtu,
            EnergyIpOpt::Mmbtu => EnergyIp::MmBtu,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PowerIpOpt {
    Btuh,
    Tons,
}

impl From<PowerIpOpt> for PowerIp {
    fn from(value: PowerIpOpt) -> Self {
        match value {
            PowerIpOpt::Btuh => PowerIp::BtuPerHour,
            PowerIpOpt::Tons => PowerIp::Tons,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TempSiOpt {
    C,
    K,
}

impl From<TempSiOpt> for TempSi {
    fn from(value: TempSiOpt) -> Self {
        match value {
            TempSiOpt::C => TempSi::C,
            TempSiOpt::K => TempSi::K,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PeriodOpt {
    Daily,
    Monthly,
}

impl From<PeriodOpt> for DegreeDayPeriod {
    fn from(value: PeriodOpt) -> Self {
        match value {
            PeriodOpt::Daily => DegreeDayPeriod::Daily,
            PeriodOpt::Monthly => DegreeDayPeriod::Monthly,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ResponseOpt {
    Heating,
    Cooling,
    Both,
}

impl From<ResponseOpt> for ResponseMode {
    fn from(value: ResponseOpt) -> Self {
        match value {
            ResponseOpt::Heating => ResponseMode::Heating,
            ResponseOpt::Cooling => ResponseMode::Cooling,
            ResponseOpt::Both => ResponseMode::Both,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.command.common().verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::List(args) => handle_list(args),
        Command::Series(args) => handle_series(args),
        Command::Stats(args) => handle_stats(args),
        Command::Ldc(args) => handle_ldc(args),
        Command::Tariff(args) => handle_tariff(args),
        Command::DegreeDays(args) => handle_degree_days(args),
        Command::Balance(args) => handle_balance(args),
    }
}

/// Config file (if any) with unit flags applied on top.
fn build_config(common: &CommonArgs) -> Result<ExplorerConfig> {
    let mut config = match common.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ExplorerConfig::from_json_str(&text)
                .with_context(|| format!("{} is not a valid config", path.display()))?
        }
        None => ExplorerConfig::default(),
    };
    if common.ip {
        config.units.is_ip = true;
    }
    if let Some(unit) = common.energy_si {
        config.units.energy_si = unit.into();
    }
    if let Some(unit) = common.energy_ip {
        config.units.energy_ip = unit.into();
    }
    if let Some(unit) = common.power_ip {
        config.units.power_ip = unit.into();
    }
    if let Some(unit) = common.temp_si {
        config.units.temp_si = unit.into();
    }
    Ok(config)
}

fn load_archive(common: &CommonArgs) -> Result<Archive> {
    let t_load = Instant::now();
    let archive = Archive::load(&common.archive)?;
    if common.verbose {
        info!(
            "Load stage: {:.1} ms ({} dictionary entries)",
            t_load.elapsed().as_secs_f64() * 1000.0,
            archive.dictionary.len()
        );
    }
    Ok(archive)
}

fn select(archive: &Archive, ids: &[i64], verbose: bool) -> Result<Vec<Series>> {
    let t_select = Instant::now();
    let series = archive.select(ids)?;
    if verbose {
        info!(
            "Select stage: {:.1} ms ({} series, {} points)",
            t_select.elapsed().as_secs_f64() * 1000.0,
            series.len(),
            series.iter().map(|s| s.points.len()).sum::<usize>()
        );
    }
    Ok(series)
}

fn csv_writer(path: &Path) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = if path.as_os_str() == "-" {
        Box::new(io::stdout().lock())
    } else {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Box::new(file)
    };
    Ok(csv::Writer::from_writer(sink))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if path.as_os_str() == "-" {
        let mut handle = io::stdout().lock();
        handle.write_all(text.as_bytes())?;
        handle.flush()?;
    } else {
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn opt_cell(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "n/a".into())
}

fn handle_list(args: ListArgs) -> Result<()> {
    let config = build_config(&args.common)?;
    let archive = load_archive(&args.common)?;

    let mut writer = csv_writer(&args.common.output)?;
    writer.write_record(["id", "freq", "meter", "name", "key", "units", "display_units"])?;
    let mut listed = 0usize;
    for entry in archive
        .dictionary
        .iter()
        .filter(|e| !args.meters || e.is_meter())
    {
        writer.write_record([
            entry.id.to_string(),
            entry.freq.to_string(),
            entry.is_meter().to_string(),
            entry.name.clone(),
            entry.key.clone(),
            entry.units.clone(),
            convert_unit_label(&entry.units, &config.units),
        ])?;
        listed += 1;
    }
    writer.flush()?;
    info!("Listed {} of {} entries", listed, archive.dictionary.len());
    Ok(())
}

fn apply_series_flags(config: &mut ExplorerConfig, args: &SeriesArgs) {
    if let Some(mode) = args.resample {
        config.resample = mode.into();
    }
    if let Some(mode) = args.aggregation {
        config.aggregation = mode.into();
    }
}

fn handle_series(args: SeriesArgs) -> Result<()> {
    let mut config = build_config(&args.common)?;
    apply_series_flags(&mut config, &args);
    let archive = load_archive(&args.common)?;
    let series = select(&archive, &args.ids, args.common.verbose)?;
    let base_freq = base_frequency(&series)?;

    let t_resample = Instant::now();
    let shown: Vec<Series> = series
        .par_iter()
        .map(|s| resample_series(s, &config))
        .collect();
    if args.common.verbose {
        info!(
            "Resample stage: {:.1} ms ({:?})",
            t_resample.elapsed().as_secs_f64() * 1000.0,
            config.resample
        );
    }

    let csv = export_csv(&shown, base_freq, &config.units).context("failed to format CSV")?;
    write_text(&args.common.output, &csv)
}

#[derive(Serialize)]
struct SeriesStats {
    id: i64,
    name: String,
    units: String,
    stats: eplus_ts::DescriptiveStats,
}

fn handle_stats(args: SeriesArgs) -> Result<()> {
    let mut config = build_config(&args.common)?;
    apply_series_flags(&mut config, &args);
    let archive = load_archive(&args.common)?;
    let series = select(&archive, &args.ids, args.common.verbose)?;
    base_frequency(&series)?;

    let report: Vec<SeriesStats> = series
        .par_iter()
        .map(|s| {
            let shown = resample_series(s, &config);
            let values = convert_values(&shown.points, s.units(), &config.units);
            SeriesStats {
                id: s.entry.id,
                name: s.entry.display_name(),
                units: convert_unit_label(s.units(), &config.units),
                stats: compute_stats(&values),
            }
        })
        .collect();

    for row in &report {
        if row.stats.is_empty() {
            warn!("{} (id {}): no finite values", row.name, row.id);
        } else {
            info!(
                "{}: mean {} {}, max {} {}",
                row.name,
                fmt_compact(row.stats.mean),
                row.units,
                fmt_compact(row.stats.max),
                row.units
            );
        }
    }

    let json = serde_json::to_string_pretty(&report)?;
    write_text(&args.common.output, &(json + "\n"))
}

fn handle_ldc(args: LdcArgs) -> Result<()> {
    let config = build_config(&args.common)?;
    let archive = load_archive(&args.common)?;
    let series = select(&archive, &args.ids, args.common.verbose)?;

    let curves = series
        .par_iter()
        .map(|s| {
            series_ldc(s, &config.units, args.normalize)
                .with_context(|| format!("load-duration curve for id {}", s.entry.id))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut writer = csv_writer(&args.common.output)?;
    writer.write_record(["series_id", "pct_time", "value"])?;
    for (s, curve) in series.iter().zip(&curves) {
        for point in curve {
            writer.write_record([
                s.entry.id.to_string(),
                format!("{:.4}", point.x),
                point.y.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    info!(
        "Wrote {} curves ({} points)",
        curves.len(),
        curves.iter().map(Vec::len).sum::<usize>()
    );
    Ok(())
}

fn handle_tariff(args: TariffArgs) -> Result<()> {
    let mut config = build_config(&args.common)?;
    if let Some(rate) = args.rate_elec {
        config.tariff.rate_elec = rate;
    }
    if let Some(rate) = args.rate_dh {
        config.tariff.rate_dh = rate;
    }
    if let Some(rate) = args.rate_dc {
        config.tariff.rate_dc = rate;
    }
    if let Some(rate) = args.demand_rate {
        config.tariff.demand_rate = rate;
    }
    let archive = load_archive(&args.common)?;
    let series = select(&archive, &args.ids, args.common.verbose)?;

    let mut writer = csv_writer(&args.common.output)?;
    writer.write_record(["series_id", "name", "kind", "energy", "demand", "total"])?;
    let mut grand_total = 0.0;
    for s in &series {
        let cost = compute_tariff_cost(s, &config.tariff, s.freq());
        if cost.is_none() {
            warn!(
                "{} (id {}): no tariff cost (needs hourly energy data)",
                s.entry.display_name(),
                s.entry.id
            );
        }
        grand_total += cost.map_or(0.0, |c| c.total);
        writer.write_record([
            s.entry.id.to_string(),
            s.entry.display_name(),
            eplus_ts::get_fuel_kind(Some(&s.entry)).as_str().to_string(),
            opt_cell(cost.map(|c| c.energy)),
            opt_cell(cost.map(|c| c.demand)),
            opt_cell(cost.map(|c| c.total)),
        ])?;
    }
    writer.flush()?;
    info!("Tariff total: {}", kpi_fmt(Some(grand_total), Some(2)));
    Ok(())
}

fn handle_degree_days(args: DegreeDayArgs) -> Result<()> {
    let mut config = build_config(&args.common)?;
    if let Some(base) = args.base_temp {
        config.degree_days.base_temp = base;
    }
    if let Some(period) = args.period {
        config.degree_days.period = period.into();
    }
    if let Some(mode) = args.mode {
        config.degree_days.mode = mode.into();
    }
    let dd = config.degree_days.clone();

    let archive = load_archive(&args.common)?;
    let temp = archive.series(args.temp, 0)?;
    if unit_kind(temp.units()) != UnitKind::Temperature {
        return Err(anyhow!(
            "id {} is not a temperature ({})",
            args.temp,
            temp.units()
        ));
    }
    let shown = convert_points(&temp.points, temp.units(), &config.units);
    let rows = compute_degree_days(&shown, dd.base_temp, dd.period, &config.units, temp.freq());

    let loads = match args.load {
        Some(id) => {
            let load = archive.series(id, 1)?;
            if load.freq() != temp.freq() {
                return Err(anyhow!(
                    "load id {} is {} but temperature id {} is {}",
                    id,
                    load.freq(),
                    args.temp,
                    temp.freq()
                ));
            }
            let load_shown = convert_points(&load.points, load.units(), &config.units);
            Some(period_totals(
                &load_shown,
                dd.period,
                load.freq(),
                load.units(),
                config.aggregation,
            ))
        }
        None => None,
    };

    let mut writer = csv_writer(&args.common.output)?;
    writer.write_record(["label", "hdd", "cdd", "temp_c", "load"])?;
    for row in &rows {
        let load = loads.as_ref().and_then(|l| l.get(&row.label).copied());
        writer.write_record([
            row.label.clone(),
            format!("{:.4}", row.hdd),
            format!("{:.4}", row.cdd),
            format!("{:.4}", row.temp_c),
            opt_cell(load),
        ])?;
    }
    writer.flush()?;
    info!(
        "{} {} buckets at base {:.1} °C",
        rows.len(),
        match dd.period {
            DegreeDayPeriod::Daily if temp.freq() == Frequency::Hourly => "daily",
            _ => "monthly",
        },
        dd.base_temp
    );

    if let Some(loads) = loads.as_ref() {
        match fit_temperature_response(&rows, loads, dd.mode) {
            Some(model) => info!(
                "Temperature response: load = {} + {} HDD + {} CDD (r2 {})",
                fmt_compact(Some(model.intercept)),
                fmt_compact(model.h_coeff),
                fmt_compact(model.c_coeff),
                fmt_compact(Some(model.r2))
            ),
            None => warn!("Temperature response not computable for this data"),
        }
    }
    Ok(())
}

fn handle_balance(args: BalanceArgs) -> Result<()> {
    let config = build_config(&args.common)?;
    let text = fs::read_to_string(&args.categories)
        .with_context(|| format!("failed to read categories {}", args.categories.display()))?;
    let categories: Vec<LoadBalanceCategory> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid category list", args.categories.display()))?;
    if categories.is_empty() {
        return Err(anyhow!("category list was empty"));
    }

    let archive = load_archive(&args.common)?;
    let ids: Vec<i64> = archive
        .dictionary
        .iter()
        .filter(|e| categories.iter().any(|c| c.matches_name(&e.name)))
        .map(|e| e.id)
        .collect();
    if ids.is_empty() {
        warn!("No dictionary entries match the categories");
    }
    let series = select(&archive, &ids, args.common.verbose)?;
    let rows = compute_load_balance(&series, &categories, &config.units);

    let mut writer = csv_writer(&args.common.output)?;
    let mut header = vec!["label".to_string()];
    header.extend(categories.iter().map(|c| c.id.clone()));
    header.push("net".into());
    writer.write_record(&header)?;
    for row in &rows {
        let mut record = vec![row.label.clone()];
        record.extend(
            categories
                .iter()
                .map(|c| row.values.get(&c.id).copied().unwrap_or(0.0).to_string()),
        );
        record.push(row.net.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!(
        "Load balance: {} months from {} series",
        rows.len(),
        series.len()
    );
    Ok(())
}
