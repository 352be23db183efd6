//! rsx query - Plan a hybrid search query

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::{Result, RsError};
use crate::search::{FieldWeight, HybridSpec, SearchMode};

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Search text
    pub text: String,

    /// Table to search
    #[arg(long, default_value = "documents")]
    pub table: String,

    /// Primary key column
    #[arg(long, default_value = "id")]
    pub id_column: String,

    /// Text field with weight, as `column:weight` (repeatable)
    #[arg(long = "field", default_value = "body:A")]
    pub fields: Vec<String>,

    /// Vector column
    #[arg(long, default_value = "embedding")]
    pub embedding_column: String,

    /// Column compared case-insensitively for the exact-match boost
    #[arg(long)]
    pub exact_column: Option<String>,
}

impl QueryArgs {
    fn spec(&self) -> Result<HybridSpec> {
        let fields = self
            .fields
            .iter()
            .map(|raw| parse_field(raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(HybridSpec {
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            fields,
            embedding_column: self.embedding_column.clone(),
            exact_match_column: self.exact_column.clone(),
        })
    }
}

/// `title:A` → (`title`, A). A bare column gets weight D.
fn parse_field(raw: &str) -> Result<(String, FieldWeight)> {
    let Some((column, weight)) = raw.rsplit_once(':') else {
        return Ok((raw.trim().to_string(), FieldWeight::D));
    };
    let weight = FieldWeight::parse(weight)
        .ok_or_else(|| RsError::Validation(format!("invalid field weight in '{raw}', expected A-D")))?;
    Ok((column.trim().to_string(), weight))
}

pub fn run(ctx: &AppContext, args: &QueryArgs) -> Result<()> {
    let spec = args.spec()?;
    let pipeline = ctx.query_pipeline()?;
    let planned = pipeline.plan(&args.text, &spec)?;

    if ctx.is_json() {
        return output::emit_json(&output::json_ok(&planned));
    }

    let mut layout = HumanLayout::new();
    layout.title("Query plan");
    let mode = match planned.mode {
        SearchMode::Hybrid => "hybrid",
        SearchMode::LexicalOnly => "lexical only",
    };
    layout.kv("mode", mode);
    layout.kv("tsquery", &planned.query.lexical.to_string());
    layout.kv(
        "weights",
        &format!("text {:.2} / vector {:.2}", planned.query.text_weight, planned.query.vector_weight),
    );
    if let Some(source) = planned.embedding_source {
        layout.kv("embedding", &format!("{source:?}").to_lowercase());
    }
    if let Some(message) = &planned.degradation {
        layout.blank();
        layout.push_line(format!("{} {}", output::icon_glyph(message.icon), message.title));
        layout.push_line(format!("  {}", message.message));
    }
    layout.blank();
    layout.section("SQL");
    layout.push_line(planned.query.sql.clone());
    if !planned.query.params.is_empty() {
        layout.blank();
        layout.section("Parameters");
        for (i, param) in planned.query.params.iter().enumerate() {
            let mut value = param.to_bind_string();
            let chars = value.chars().count();
            if chars > 80 {
                value = format!("{}... ({chars} chars)", value.chars().take(77).collect::<String>());
            }
            layout.kv(&format!("${}", i + 1), &value);
        }
    }
    output::emit_human(layout);
    Ok(())
}
