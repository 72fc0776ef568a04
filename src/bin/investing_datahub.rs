use investing_datahub::config::Config;
use investing_datahub::models::calendar::CalendarKind;
use investing_datahub::models::instrument::InstrumentFamily;
use investing_datahub::models::market::TechnicalInterval;
use investing_datahub::models::price::{Interval, Projection, SortOrder};
use investing_datahub::services::assembler::PriceOutput;
use investing_datahub::services::data_service::{
    CalendarRequest, DataService, HistoricalRequest, PriceData, RecentRequest,
};
use investing_datahub::services::market_data::{OverviewRequest, QuoteSearchRequest, TechnicalRequest};
use investing_datahub::util::arrow_utils;

use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::info;
use std::path::Path;

fn instrument_args<'a>(cmd: App<'a>) -> App<'a> {
    cmd.arg(
        Arg::with_name("family")
            .short('f')
            .long("family")
            .value_name("FAMILY")
            .help("Instrument family (stock, fund, etf, index, currency_cross, bond, commodity, crypto, certificate)")
            .required(true)
            .takes_value(true),
    )
    .arg(
        Arg::with_name("name")
            .short('n')
            .long("name")
            .value_name("NAME")
            .help("Instrument name, or symbol for stocks")
            .required(true)
            .takes_value(true),
    )
    .arg(
        Arg::with_name("country")
            .short('c')
            .long("country")
            .value_name("COUNTRY")
            .help("Country the instrument is listed in")
            .takes_value(true),
    )
    .arg(
        Arg::with_name("exchange")
            .long("exchange")
            .value_name("EXCHANGE")
            .help("Stock exchange, for instruments listed on several")
            .takes_value(true),
    )
    .arg(
        Arg::with_name("order")
            .long("order")
            .value_name("ORDER")
            .help("ascending or descending")
            .takes_value(true)
            .default_value("ascending"),
    )
    .arg(
        Arg::with_name("interval")
            .long("interval")
            .value_name("INTERVAL")
            .help("Daily, Weekly or Monthly")
            .takes_value(true)
            .default_value("daily"),
    )
    .arg(
        Arg::with_name("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .help("Write an Arrow IPC file instead of printing JSON")
            .takes_value(true),
    )
}

fn family_arg<'a>() -> Arg<'a> {
    Arg::with_name("family")
        .short('f')
        .long("family")
        .value_name("FAMILY")
        .required(true)
        .takes_value(true)
}

// 只需要名称和国家的子命令
fn named_instrument_args<'a>(cmd: App<'a>, with_family: bool) -> App<'a> {
    let cmd = if with_family { cmd.arg(family_arg()) } else { cmd };
    cmd.arg(
        Arg::with_name("name")
            .short('n')
            .long("name")
            .value_name("NAME")
            .help("Instrument name, or symbol for stocks")
            .required(true)
            .takes_value(true),
    )
    .arg(
        Arg::with_name("country")
            .short('c')
            .long("country")
            .value_name("COUNTRY")
            .takes_value(true),
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut config = Config::new();

    if let Some(dir) = matches.value_of("data-dir") {
        config = config.with_data_dir(dir);
    }
    if let Some(url) = matches.value_of("base-url") {
        config = config.with_base_url(url);
    }
    if let Some(tz) = matches.value_of("tz") {
        let tz: Tz = tz.parse().map_err(|e| anyhow!("invalid time zone '{}': {}", tz, e))?;
        config = config.with_exchange_tz(tz);
    }
    if let Some(years) = matches.value_of("max-span-years") {
        config = config.with_max_span_years(years.parse().context("max-span-years must be a positive integer")?);
    }

    Ok(config)
}

fn projection_for(matches: &ArgMatches) -> Projection {
    if matches.is_present("output") {
        Projection::Table
    } else {
        Projection::RecordList
    }
}

fn emit_prices(data: &PriceData, output: Option<&str>) -> anyhow::Result<()> {
    match (output, &data.output) {
        (Some(path), PriceOutput::Table(batch)) => {
            arrow_utils::save_table_to_arrow(batch, Path::new(path))?;
            info!("Saved {} rows for {} to {}", batch.num_rows(), data.name, path);
        }
        _ => println!("{}", serde_json::to_string_pretty(&data.to_json()?)?),
    }
    Ok(())
}

fn values(matches: &ArgMatches, name: &str) -> Vec<String> {
    matches
        .values_of(name)
        .map(|values| values.map(str::to_string).collect())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let app = App::new("InvestingDataHub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Historical prices and financial calendars from Investing.com")
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding the reference CSV files")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("base-url")
                .long("base-url")
                .value_name("URL")
                .help("Override the upstream base URL")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("tz")
                .long("tz")
                .value_name("TZ")
                .help("Exchange time zone used to convert row timestamps (e.g. Europe/Madrid)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("max-span-years")
                .long("max-span-years")
                .value_name("YEARS")
                .help("Maximum number of years per historical request")
                .takes_value(true)
                .global(true),
        );

    let app = app
        .subcommand(
            instrument_args(SubCommand::with_name("historical").about("Fetch historical prices for a date range"))
                .arg(
                    Arg::with_name("from")
                        .long("from")
                        .value_name("DD/MM/YYYY")
                        .help("Start date")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("to")
                        .long("to")
                        .value_name("DD/MM/YYYY")
                        .help("End date")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(instrument_args(
            SubCommand::with_name("recent").about("Fetch the most recent prices"),
        ))
        .subcommand(
            SubCommand::with_name("calendar")
                .about("Fetch the economic, earnings or holiday calendar")
                .arg(
                    Arg::with_name("kind")
                        .short('k')
                        .long("kind")
                        .value_name("KIND")
                        .help("economic, earnings or holidays")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("time-zone")
                        .long("time-zone")
                        .value_name("GMT +H:MM")
                        .help("Time zone label, defaults to the local offset")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("time-filter")
                        .long("time-filter")
                        .value_name("FILTER")
                        .help("time_only or time_remaining")
                        .takes_value(true)
                        .default_value("time_only"),
                )
                .arg(
                    Arg::with_name("country")
                        .short('c')
                        .long("country")
                        .value_name("COUNTRY")
                        .help("Country filter, may be repeated")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("importance")
                        .long("importance")
                        .value_name("IMPORTANCE")
                        .help("low, medium or high, may be repeated")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("category")
                        .long("category")
                        .value_name("CATEGORY")
                        .help("Event category, may be repeated")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("from")
                        .long("from")
                        .value_name("DD/MM/YYYY")
                        .takes_value(true)
                        .requires("to"),
                )
                .arg(
                    Arg::with_name("to")
                        .long("to")
                        .value_name("DD/MM/YYYY")
                        .takes_value(true)
                        .requires("from"),
                ),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Search the reference data")
                .arg(
                    Arg::with_name("family")
                        .short('f')
                        .long("family")
                        .value_name("FAMILY")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("by")
                        .long("by")
                        .value_name("COLUMN")
                        .help("Column to match (name, full_name, symbol, isin, country, group, status, ...)")
                        .takes_value(true)
                        .default_value("name"),
                )
                .arg(
                    Arg::with_name("value")
                        .short('v')
                        .long("value")
                        .value_name("VALUE")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("countries")
                .about("List the countries available for a family")
                .arg(
                    Arg::with_name("family")
                        .short('f')
                        .long("family")
                        .value_name("FAMILY")
                        .required(true)
                        .takes_value(true),
                ),
        );

    let app = app
        .subcommand(named_instrument_args(
            SubCommand::with_name("information").about("Fetch the overview data block of an instrument page"),
            true,
        ))
        .subcommand(
            SubCommand::with_name("overview")
                .about("Fetch the market overview of a family in a country")
                .arg(family_arg())
                .arg(
                    Arg::with_name("country")
                        .short('c')
                        .long("country")
                        .value_name("COUNTRY")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("n-results")
                        .long("n-results")
                        .value_name("N")
                        .help("Number of rows, between 1 and 1000")
                        .takes_value(true)
                        .default_value("100"),
                ),
        )
        .subcommand(
            named_instrument_args(
                SubCommand::with_name("technical").about("Fetch technical indicators, moving averages or pivot points"),
                true,
            )
            .arg(
                Arg::with_name("table")
                    .long("table")
                    .value_name("TABLE")
                    .help("indicators, moving_averages or pivot_points")
                    .takes_value(true)
                    .default_value("indicators"),
            )
            .arg(
                Arg::with_name("interval")
                    .long("interval")
                    .value_name("INTERVAL")
                    .help("5mins, 15mins, 30mins, 1hour, 5hours, daily, weekly or monthly")
                    .takes_value(true)
                    .default_value("daily"),
            ),
        )
        .subcommand(
            SubCommand::with_name("quote-search")
                .about("Search quotes on the whole site")
                .arg(
                    Arg::with_name("text")
                        .short('t')
                        .long("text")
                        .value_name("TEXT")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("filter")
                        .long("filter")
                        .value_name("FILTER")
                        .help("stocks, etfs, funds, indices, ... may be repeated")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("country")
                        .short('c')
                        .long("country")
                        .value_name("COUNTRY")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("n-results")
                        .long("n-results")
                        .value_name("N")
                        .takes_value(true),
                ),
        )
        .subcommand(named_instrument_args(
            SubCommand::with_name("dividends").about("Fetch the dividend history of a stock"),
            false,
        ))
        .subcommand(named_instrument_args(
            SubCommand::with_name("profile").about("Fetch the company profile of a stock"),
            false,
        ))
        .subcommand(
            SubCommand::with_name("commodities")
                .about("List commodities, optionally of one group")
                .arg(
                    Arg::with_name("group")
                        .short('g')
                        .long("group")
                        .value_name("GROUP")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("groups")
                        .long("groups")
                        .help("Only list the available groups")
                        .conflicts_with("group"),
                ),
        );

    let matches = app.get_matches();
    let config = build_config(&matches)?;

    match matches.subcommand() {
        Some(("historical", sub)) => {
            let service = DataService::from_config(config)?;
            let family: InstrumentFamily = sub.value_of("family").unwrap_or_default().parse()?;
            let mut request = HistoricalRequest::new(
                family,
                sub.value_of("name").unwrap_or_default(),
                sub.value_of("from").unwrap_or_default(),
                sub.value_of("to").unwrap_or_default(),
            )
            .with_order(sub.value_of("order").unwrap_or("ascending").parse::<SortOrder>()?)
            .with_interval(sub.value_of("interval").unwrap_or("daily").parse::<Interval>()?)
            .with_projection(projection_for(sub));
            if let Some(country) = sub.value_of("country") {
                request = request.with_country(country);
            }
            if let Some(exchange) = sub.value_of("exchange") {
                request = request.with_stock_exchange(exchange);
            }

            let data = service.historical_data(&request).await?;
            emit_prices(&data, sub.value_of("output"))?;
        }
        Some(("recent", sub)) => {
            let service = DataService::from_config(config)?;
            let family: InstrumentFamily = sub.value_of("family").unwrap_or_default().parse()?;
            let mut request = RecentRequest::new(family, sub.value_of("name").unwrap_or_default())
                .with_order(sub.value_of("order").unwrap_or("ascending").parse::<SortOrder>()?)
                .with_interval(sub.value_of("interval").unwrap_or("daily").parse::<Interval>()?)
                .with_projection(projection_for(sub));
            if let Some(country) = sub.value_of("country") {
                request = request.with_country(country);
            }
            if let Some(exchange) = sub.value_of("exchange") {
                request = request.with_stock_exchange(exchange);
            }

            let data = service.recent_data(&request).await?;
            emit_prices(&data, sub.value_of("output"))?;
        }
        Some(("calendar", sub)) => {
            let service = DataService::from_config(config)?;
            let kind: CalendarKind = sub.value_of("kind").unwrap_or_default().parse()?;
            let mut request = CalendarRequest::new(kind)
                .with_time_filter(sub.value_of("time-filter").unwrap_or("time_only"))
                .with_countries(values(sub, "country"))
                .with_importances(values(sub, "importance"))
                .with_categories(values(sub, "category"));
            if let Some(tz) = sub.value_of("time-zone") {
                request = request.with_time_zone(tz);
            }
            if let (Some(from), Some(to)) = (sub.value_of("from"), sub.value_of("to")) {
                request = request.with_date_range(from, to);
            }

            let rows = service.calendar(&request).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Some(("search", sub)) => {
            let service = DataService::from_config(config)?;
            let family: InstrumentFamily = sub.value_of("family").unwrap_or_default().parse()?;
            let records = service.reference().search(
                family,
                sub.value_of("by").unwrap_or("name"),
                sub.value_of("value").unwrap_or_default(),
            )?;
            info!("Found {} {} records", records.len(), family);
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Some(("countries", sub)) => {
            let service = DataService::from_config(config)?;
            let family: InstrumentFamily = sub.value_of("family").unwrap_or_default().parse()?;
            let countries = service.reference().list_countries(family)?;
            println!("{}", serde_json::to_string_pretty(&countries)?);
        }
        Some(("information", sub)) => {
            let service = DataService::from_config(config)?;
            let family: InstrumentFamily = sub.value_of("family").unwrap_or_default().parse()?;
            let info = service
                .information(family, sub.value_of("name").unwrap_or_default(), sub.value_of("country"))
                .await?;
            print_json(&info)?;
        }
        Some(("overview", sub)) => {
            let service = DataService::from_config(config)?;
            let family: InstrumentFamily = sub.value_of("family").unwrap_or_default().parse()?;
            let n_results: usize = sub
                .value_of("n-results")
                .unwrap_or("100")
                .parse()
                .context("n-results must be a positive integer")?;
            let request = OverviewRequest::new(family, sub.value_of("country").unwrap_or_default()).with_n_results(n_results);
            print_json(&service.overview(&request).await?)?;
        }
        Some(("technical", sub)) => {
            let service = DataService::from_config(config)?;
            let family: InstrumentFamily = sub.value_of("family").unwrap_or_default().parse()?;
            let interval: TechnicalInterval = sub.value_of("interval").unwrap_or("daily").parse()?;
            let mut request = TechnicalRequest::new(family, sub.value_of("name").unwrap_or_default()).with_interval(interval);
            if let Some(country) = sub.value_of("country") {
                request = request.with_country(country);
            }

            match sub.value_of("table").unwrap_or("indicators") {
                "indicators" => print_json(&service.technical_indicators(&request).await?)?,
                "moving_averages" => print_json(&service.moving_averages(&request).await?)?,
                "pivot_points" => print_json(&service.pivot_points(&request).await?)?,
                other => return Err(anyhow!("unknown technical table '{}'", other)),
            }
        }
        Some(("quote-search", sub)) => {
            let service = DataService::from_config(config)?;
            let mut request = QuoteSearchRequest::new(sub.value_of("text").unwrap_or_default())
                .with_filters(values(sub, "filter"))
                .with_countries(values(sub, "country"));
            if let Some(n) = sub.value_of("n-results") {
                request = request.with_n_results(n.parse().context("n-results must be a positive integer")?);
            }
            print_json(&service.search_quotes(&request).await?)?;
        }
        Some(("dividends", sub)) => {
            let service = DataService::from_config(config)?;
            let country = sub.value_of("country").ok_or_else(|| anyhow!("--country is required for stocks"))?;
            let dividends = service
                .stock_dividends(sub.value_of("name").unwrap_or_default(), country)
                .await?;
            print_json(&dividends)?;
        }
        Some(("profile", sub)) => {
            let service = DataService::from_config(config)?;
            let country = sub.value_of("country").ok_or_else(|| anyhow!("--country is required for stocks"))?;
            let profile = service
                .company_profile(sub.value_of("name").unwrap_or_default(), country)
                .await?;
            print_json(&profile)?;
        }
        Some(("commodities", sub)) => {
            let service = DataService::from_config(config)?;
            if sub.is_present("groups") {
                print_json(&service.reference().commodity_groups()?)?;
            } else {
                print_json(&service.reference().commodities(sub.value_of("group"))?)?;
            }
        }
        _ => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}
