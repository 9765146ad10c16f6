use std::collections::HashSet;

use toolseek_core::types::{Collection, CorpusDocument, CorpusSnapshot, Score};
use toolseek_text::{KeywordRetriever, SparseRetriever};

fn doc(id: &str, text: &str) -> CorpusDocument {
    CorpusDocument::new(id, text, Vec::new())
}

fn tools_corpus() -> CorpusSnapshot {
    CorpusSnapshot {
        descriptors: vec![
            doc("weather_lookup", r#"{"name":"weather_lookup","description":"get current weather for a city"}"#),
            doc(
                "currency_convert",
                r#"{"name":"currency_convert","description":"convert money between currencies at today's rate"}"#,
            ),
            doc("stock_quote", r#"{"name":"stock_quote","description":"latest stock price for a ticker symbol"}"#),
            doc("blank", "   ...   "),
        ],
        hypothetical_queries: vec![
            doc("weather_lookup", "will it rain in Paris tomorrow? what is the weather in Tokyo?"),
            doc("stock_quote", "how much is one share of ACME worth right now?"),
        ],
    }
}

#[test]
fn keyword_scenario_single_weather_document() {
    let snapshot = CorpusSnapshot {
        descriptors: vec![doc("weather_lookup", "get current weather for a city")],
        hypothetical_queries: vec![],
    };
    let hits = KeywordRetriever::default().search(&snapshot, "what's the weather today", 1).expect("keyword");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tool_id, "weather_lookup");
    assert!(hits[0].score.raw() > 0.0);
    assert!(hits[0].score.raw() <= 1.0);
}

#[test]
fn keyword_merges_descriptor_and_hypothetical_hits() {
    let hits = KeywordRetriever::default().search(&tools_corpus(), "weather in Paris", 5).expect("keyword");
    let ids: Vec<_> = hits.iter().map(|c| c.tool_id.as_str()).collect();
    assert_eq!(ids.iter().filter(|id| **id == "weather_lookup").count(), 1);
    assert_eq!(ids[0], "weather_lookup");
    // "Paris" only appears in the hypothetical queries, so that document wins the dedup.
    assert_eq!(hits[0].source, Collection::HypotheticalQueries);
}

#[test]
fn sparse_ranks_matching_tool_first_with_normalized_scores() {
    let hits = SparseRetriever::default().search(&tools_corpus(), "stock price", 3).expect("sparse");
    assert_eq!(hits[0].tool_id, "stock_quote");
    match hits[0].score {
        Score::Sparse { raw, normalized } => {
            assert!(raw > 0.0);
            assert!(normalized > 0.99 && normalized <= 1.0);
        }
        other => panic!("unexpected score {other:?}"),
    }
    for pair in hits.windows(2) {
        assert!(pair[0].score.raw() >= pair[1].score.raw());
    }
}

#[test]
fn sparse_handles_cjk_text() {
    let snapshot = CorpusSnapshot {
        descriptors: vec![doc("weather_cn", "查询指定城市的实时天气"), doc("fx_cn", "人民币与美元汇率换算")],
        hypothetical_queries: vec![],
    };
    let hits = SparseRetriever::default().search(&snapshot, "北京天气怎么样", 2).expect("sparse");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tool_id, "weather_cn");
}

#[test]
fn results_are_bounded_and_unique() {
    let corpus = tools_corpus();
    for n in 1..=4 {
        for hits in [
            SparseRetriever::default().search(&corpus, "what is the weather or stock price today", n).unwrap(),
            KeywordRetriever::default().search(&corpus, "what is the weather or stock price today", n).unwrap(),
        ] {
            assert!(hits.len() <= n);
            let ids: HashSet<_> = hits.iter().map(|c| c.tool_id.clone()).collect();
            assert_eq!(ids.len(), hits.len());
        }
    }
}

#[test]
fn empty_corpus_and_empty_query_return_nothing() {
    let empty = CorpusSnapshot::default();
    assert!(SparseRetriever::default().search(&empty, "weather", 5).unwrap().is_empty());
    assert!(KeywordRetriever::default().search(&empty, "weather", 5).unwrap().is_empty());
    let corpus = tools_corpus();
    assert!(SparseRetriever::default().search(&corpus, "?!", 5).unwrap().is_empty());
    assert!(KeywordRetriever::default().search(&corpus, "", 5).unwrap().is_empty());
}

#[test]
fn untokenizable_documents_are_skipped() {
    let snapshot = CorpusSnapshot {
        descriptors: vec![doc("blank", "!!!"), doc("ok", "send an email")],
        hypothetical_queries: vec![],
    };
    let hits = KeywordRetriever::default().search(&snapshot, "email", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tool_id, "ok");
}
