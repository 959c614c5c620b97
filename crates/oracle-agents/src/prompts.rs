use oracle_models::{AnalystStyle, MarketSnapshot};

/// The reply format every analyst is held to. The parser reads these three
/// prefixes and nothing else.
const REPLY_FORMAT: &str = "Respond in this EXACT format (no extra text):\n\
     PREDICTION: [UP or DOWN]\n\
     CONFIDENCE: [HIGH or MEDIUM or LOW]\n\
     REASONING: [One sentence on a single line]";

/// Stand-in for the headline list when none could be fetched. Tells the
/// model there is no news rather than inventing any.
pub const NO_HEADLINES: &str = "(no headlines were available for this cycle)";

/// Stand-in when headlines were fetched but the editor kept none of them.
pub const NO_RELEVANT_HEADLINES: &str =
    "No materially market-moving news detected in the latest cycle";

/// Reply the editor gives when no headline is relevant.
pub const NONE_SELECTED: &str = "NONE";

pub const HEADLINE_EDITOR_PROMPT: &str =
    "You are a professional financial news editor. From the headlines you are given, \
     select ONLY those relevant to the US stock market, SPY or the S&P 500, the Federal \
     Reserve, inflation, interest rates, market sentiment or earnings.";

/// News a sentiment analyst works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum News {
    /// No headline source, or the fetch failed.
    Unavailable,
    /// Headlines were fetched and none of them was market relevant.
    NothingRelevant,
    Headlines(Vec<String>),
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|h| format!("- {h}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn system_prompt(style: AnalystStyle) -> &'static str {
    match style {
        AnalystStyle::Technical => {
            "You are a technical stock analyst. Judge direction from price action and \
             momentum only. Be concise and follow the exact format requested."
        }
        AnalystStyle::Sentiment => {
            "You are a professional market sentiment analyst. Judge direction from the \
             sentiment impact of the news you are given, and only that news. \
             Follow the format strictly. Be objective."
        }
    }
}

fn market_block(snapshot: &MarketSnapshot) -> String {
    format!(
        "- Asset: {}\n- Current Price: ${}\n- Today's Change: {}\n- Quoted at: {}",
        snapshot.symbol, snapshot.price, snapshot.change_percent, snapshot.timestamp
    )
}

pub fn technical_user_prompt(snapshot: &MarketSnapshot) -> String {
    format!(
        "Based on this current market data:\n{}\n\n\
         Using technical analysis principles, predict: will {} go UP or DOWN by the \
         next session?\n\n{REPLY_FORMAT}",
        market_block(snapshot),
        snapshot.symbol
    )
}

pub fn headline_selection_prompt(headlines: &[String]) -> String {
    format!(
        "Headlines:\n{}\n\n\
         Reply with the relevant headlines copied exactly, one per line and nothing \
         else. If none are relevant, reply with the single word {NONE_SELECTED}.",
        bullet_list(headlines)
    )
}

pub fn sentiment_user_prompt(snapshot: &MarketSnapshot, news: &News) -> String {
    let headlines_text = match news {
        News::Unavailable => NO_HEADLINES.to_string(),
        News::NothingRelevant => format!("- {NO_RELEVANT_HEADLINES}"),
        News::Headlines(headlines) => bullet_list(headlines),
    };

    format!(
        "Market data:\n{}\n\n\
         Relevant news headlines:\n{headlines_text}\n\n\
         Based strictly on sentiment impact, predict the next session's direction for {}.\n\n\
         {REPLY_FORMAT}",
        market_block(snapshot),
        snapshot.symbol
    )
}
