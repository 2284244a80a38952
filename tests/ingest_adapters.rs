// tests/ingest_adapters.rs
mod support;

use market_news_ingest::ingest::feed::FeedReader;
use market_news_ingest::ingest::fetcher::ContentFetcher;
use market_news_ingest::ingest::providers::{
    cnbc, financial_juice, zerohedge, FeedScrapeProvider, OutletSpec,
};
use market_news_ingest::ingest::types::{SourceAdapter, SourceId};
use std::sync::Arc;
use support::FakeFetcher;

const ZH_XML: &str = include_str!("fixtures/zerohedge_rss.xml");
const CNBC_XML: &str = include_str!("fixtures/cnbc_rss.xml");
const FJ_XML: &str = include_str!("fixtures/financialjuice_rss.xml");

fn adapter(spec: OutletSpec, xml: &str, fetcher: Arc<FakeFetcher>) -> FeedScrapeProvider {
    FeedScrapeProvider::new(spec, Arc::new(FeedReader::from_fixture(xml)), fetcher)
}

#[tokio::test]
async fn zerohedge_keeps_only_titled_full_articles() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://www.zerohedge.com/markets/fed-holds-rates", "r".repeat(600))
            .page("https://www.zerohedge.com/markets/untitled", "u".repeat(600))
            .page("https://www.zerohedge.com/commodities/gold-slips", "too short")
            .page("https://www.zerohedge.com/markets/auction-tails", "a".repeat(80)),
    );
    let before = chrono::Utc::now();
    let items = adapter(zerohedge::spec(), ZH_XML, fetcher.clone())
        .fetch_latest()
        .await
        .unwrap();

    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Fed holds rates", "Treasury auction tails"]);
    assert!(items.iter().all(|i| i.source == SourceId::ZeroHedge));
    assert!(items.iter().all(|i| i.content.chars().count() >= 50));
    assert_eq!(items[0].content.len(), 600);
    assert_eq!(items[0].timestamp.to_rfc3339(), "2025-06-18T18:05:00+00:00");
    // garbage pubDate: stamped with fetch time
    assert!(items[1].timestamp >= before);

    // the untitled entry never reached the browser; tracking params were stripped first
    let calls = fetcher.calls();
    assert!(!calls.iter().any(|u| u.ends_with("/untitled")));
    assert!(calls.contains(&"https://www.zerohedge.com/commodities/gold-slips".to_string()));
}

#[tokio::test]
async fn zerohedge_strips_section_tag_when_article_is_long_enough() {
    let fetcher = Arc::new(
        FakeFetcher::new().page("https://www.zerohedge.com/commodities/gold-slips", "g".repeat(120)),
    );
    let items = adapter(zerohedge::spec(), ZH_XML, fetcher)
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Gold slips as dollar firms");
    assert_eq!(items[0].url, "https://www.zerohedge.com/commodities/gold-slips");
}

#[tokio::test]
async fn cnbc_falls_back_to_description_then_title() {
    let body = "Stocks climbed after the Federal Reserve left its benchmark rate unchanged. ".repeat(3);
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://www.cnbc.com/2025/06/18/stock-market-today.html", body.clone()),
    );
    let items = adapter(cnbc::spec(), CNBC_XML, fetcher)
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items.len(), 3);

    assert_eq!(items[0].title, "Quick update");
    assert_eq!(items[0].content, "Markets flat today");

    assert_eq!(items[1].title, "Dow futures tick higher after Fed decision");
    assert_eq!(items[1].content, body.trim());

    assert_eq!(items[2].title, "Oil prices steady");
    assert_eq!(items[2].content, "Oil prices steady");
    assert!(items.iter().all(|i| !i.content.is_empty()));
}

#[tokio::test]
async fn escaped_html_descriptions_are_cleaned() {
    // nothing scrapes, so every item carries its description or title
    let items = adapter(cnbc::spec(), CNBC_XML, Arc::new(FakeFetcher::new()))
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items[1].content, "Stock futures rose slightly on Wednesday night.");
}

#[tokio::test]
async fn financial_juice_headlines_survive_without_pages() {
    let items = adapter(financial_juice::spec(), FJ_XML, Arc::new(FakeFetcher::new()))
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "US Retail Sales MoM Actual -0.9% (Forecast -0.7%)");
    assert_eq!(items[1].title, "Crude oil extends gains");
    assert_eq!(items[1].content, "Crude oil extends gains");
    assert!(items.iter().all(|i| i.source == SourceId::FinancialJuice));
}

#[tokio::test]
async fn entry_cap_limits_scrapes() {
    let mut spec = cnbc::spec();
    spec.limit = 1;
    let fetcher = Arc::new(FakeFetcher::new());
    let items = adapter(spec, CNBC_XML, fetcher.clone())
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn broken_feed_yields_no_items() {
    let items = adapter(cnbc::spec(), "<rss><channel><item>", Arc::new(FakeFetcher::new()))
        .fetch_latest()
        .await
        .unwrap();
    assert!(items.is_empty());
}

/// Panics on one URL, serves nothing for the rest.
struct CrashOn(&'static str);

#[async_trait::async_trait]
impl ContentFetcher for CrashOn {
    async fn scrape_article(&self, url: &str) -> String {
        if url == self.0 {
            panic!("renderer crashed on {url}");
        }
        String::new()
    }
}

#[tokio::test]
async fn crashing_entry_leaves_siblings_intact() {
    let p = FeedScrapeProvider::new(
        cnbc::spec(),
        Arc::new(FeedReader::from_fixture(CNBC_XML)),
        Arc::new(CrashOn("https://www.cnbc.com/2025/06/18/oil.html")),
    );
    let items = p.fetch_latest().await.unwrap();
    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Quick update", "Dow futures tick higher after Fed decision"]
    );
}
