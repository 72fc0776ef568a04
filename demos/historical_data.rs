use investing_datahub::{
    CalendarKind, CalendarRequest, Config, DataService, HistoricalRequest, InstrumentFamily, Projection,
    RecentRequest, SortOrder,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // 创建数据服务
    let service = DataService::from_config(Config::new().with_data_dir("resources"))?;

    // 超过 20 年的区间会被拆成多次请求
    let request = HistoricalRequest::new(InstrumentFamily::Stock, "AAPL", "01/01/1990", "01/01/2020")
        .with_country("united states")
        .with_order(SortOrder::Descending)
        .with_projection(Projection::RecordList);
    let data = service.historical_data(&request).await?;

    println!("{}: {} 行", data.name, data.output.len());
    println!("{:<12} {:<10} {:<10} {:<10} {:<10} {:<15}", "日期", "开盘", "最高", "最低", "收盘", "成交量");
    println!("{:-<70}", "");
    for point in data.output.to_records()?.iter().take(5) {
        println!(
            "{:<12} {:<10.2} {:<10.2} {:<10.2} {:<10.2} {:<15}",
            point.date.format("%d/%m/%Y"),
            point.open,
            point.high,
            point.low,
            point.close,
            point.volume.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }

    // 最近行情
    let recent = service
        .recent_data(&RecentRequest::new(InstrumentFamily::CurrencyCross, "EUR/USD").with_projection(Projection::RecordList))
        .await?;
    println!("\n{}", serde_json::to_string_pretty(&recent.to_json()?)?);

    // 今日高重要性经济事件
    let events = service
        .calendar(
            &CalendarRequest::new(CalendarKind::Economic)
                .with_countries(vec!["united states".to_string()])
                .with_importances(vec!["high".to_string()]),
        )
        .await?;
    for event in events.iter().take(10) {
        println!(
            "{} {} {}",
            event.date,
            event.fields.get("time").map(String::as_str).unwrap_or("-"),
            event.fields.get("event").map(String::as_str).unwrap_or("-")
        );
    }

    Ok(())
}
