//! Hybrid query builder
//!
//! Produces PostgreSQL query fragments that combine full-text (`tsvector` /
//! `tsquery`) scoring with pgvector similarity. Only user text and embeddings
//! are bound as parameters; identifiers, language configs and weight letters
//! are checked against allow-lists before being spliced into SQL.
//!
//! ```text
//!  text ──▶ QueryCompiler ──▶ to_tsquery($1) ──┐
//!                                               ├──▶ weighted FULL OUTER JOIN
//!  embedding ─────────────▶ <=> $2::vector ─────┘
//! ```

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RsError};
use crate::search::embedding_cache::validate_vector;
use crate::search::query::{LexicalExpr, QueryCompiler};
use crate::search::text::{self, TextConfig};

/// Allowed weight-sum deviation from 1.0.
pub const WEIGHT_TOLERANCE: f32 = 0.01;

/// Score added to rows whose exact-match column equals the query text.
pub const EXACT_MATCH_BOOST: f32 = 0.1;

/// Text search configurations shipped with PostgreSQL.
pub const LANGUAGES: &[&str] = &[
    "simple",
    "arabic",
    "danish",
    "dutch",
    "english",
    "finnish",
    "french",
    "german",
    "greek",
    "hungarian",
    "indonesian",
    "irish",
    "italian",
    "lithuanian",
    "nepali",
    "norwegian",
    "portuguese",
    "romanian",
    "russian",
    "spanish",
    "swedish",
    "tamil",
    "turkish",
];

/// Plain or schema-qualified SQL identifier.
static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}(\.[A-Za-z_][A-Za-z0-9_]{0,62})?$").expect("identifier pattern is valid")
});

fn check_identifier(ident: &str) -> Result<&str> {
    if IDENTIFIER_REGEX.is_match(ident) {
        Ok(ident)
    } else {
        Err(RsError::Validation(format!(
            "invalid SQL identifier: {:?}",
            text::truncate(ident, 80)
        )))
    }
}

fn check_language(language: &str) -> Result<&str> {
    if LANGUAGES.contains(&language) {
        Ok(language)
    } else {
        Err(RsError::Validation(format!(
            "unsupported text search language: {:?}",
            text::truncate(language, 40)
        )))
    }
}

/// `tsvector` weight class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldWeight {
    A,
    B,
    C,
    D,
}

impl FieldWeight {
    pub const fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }
}

/// pgvector distance operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMetric {
    pub const fn operator(self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::L2 => "<->",
            Self::InnerProduct => "<#>",
        }
    }

    /// Expression mapping the distance to a higher-is-better similarity.
    pub fn similarity_sql(self, distance_sql: &str) -> String {
        match self {
            Self::Cosine => format!("(1 - ({distance_sql}))"),
            Self::L2 => format!("(1 / (1 + ({distance_sql})))"),
            Self::InnerProduct => format!("(-({distance_sql}))"),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::InnerProduct => "inner_product",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub enabled: bool,
    pub max_words: u32,
    pub min_words: u32,
    pub max_fragments: u32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_words: 35,
            min_words: 15,
            max_fragments: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub enabled: bool,
    /// `ts_rank_cd` normalization bitmask.
    pub normalization: u32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normalization: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub text_weight: f32,
    pub vector_weight: f32,
    pub similarity_threshold: f32,
    pub max_results: usize,
    pub distance: DistanceMetric,
    pub boost_exact_matches: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            text_weight: 0.7,
            vector_weight: 0.3,
            similarity_threshold: 0.5,
            max_results: 100,
            distance: DistanceMetric::Cosine,
            boost_exact_matches: true,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub language: String,
    pub stemming: bool,
    #[serde(flatten)]
    pub text: TextConfig,
    pub highlight: HighlightConfig,
    pub ranking: RankingConfig,
    pub hybrid: HybridConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
            stemming: true,
            text: TextConfig::default(),
            highlight: HighlightConfig::default(),
            ranking: RankingConfig::default(),
            hybrid: HybridConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        check_language(&self.language).map_err(|err| RsError::Config(err.to_string()))?;
        self.text.validate()?;
        validate_weights(self.hybrid.text_weight, self.hybrid.vector_weight)?;
        if !self.hybrid.similarity_threshold.is_finite() {
            return Err(RsError::Config(
                "search.hybrid.similarity_threshold must be finite".to_string(),
            ));
        }
        if self.hybrid.max_results == 0 {
            return Err(RsError::Config(
                "search.hybrid.max_results must be greater than 0".to_string(),
            ));
        }
        let hl = &self.highlight;
        if hl.max_words == 0 || hl.min_words > hl.max_words || hl.max_fragments == 0 {
            return Err(RsError::Config(format!(
                "search.highlight window is invalid (min_words={}, max_words={}, max_fragments={})",
                hl.min_words, hl.max_words, hl.max_fragments
            )));
        }
        Ok(())
    }
}

/// Check that hybrid weights are in `[0, 1]` and sum to 1.0 within tolerance.
pub fn validate_weights(text_weight: f32, vector_weight: f32) -> Result<()> {
    let in_range = |w: f32| w.is_finite() && (0.0..=1.0).contains(&w);
    let sum_ok = ((text_weight + vector_weight) - 1.0).abs() <= WEIGHT_TOLERANCE;
    if in_range(text_weight) && in_range(vector_weight) && sum_ok {
        Ok(())
    } else {
        Err(RsError::InvalidWeights {
            text_weight,
            vector_weight,
        })
    }
}

/// Bound query parameter, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlParam {
    Text(String),
    Vector(Vec<f32>),
}

impl SqlParam {
    /// Text form suitable for binding (pgvector accepts `[1,2,3]`).
    pub fn to_bind_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Vector(values) => {
                let mut out = String::from("[");
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{v}");
                }
                out.push(']');
                out
            }
        }
    }
}

/// Options for a single `to_tsvector` expression.
#[derive(Debug, Clone, Default)]
pub struct TsVectorOptions {
    pub weight: Option<FieldWeight>,
    /// Overrides the configured language.
    pub language: Option<String>,
}

impl TsVectorOptions {
    pub fn weighted(weight: FieldWeight) -> Self {
        Self {
            weight: Some(weight),
            language: None,
        }
    }
}

/// Compiled `tsquery` fragment.
#[derive(Debug, Clone, Serialize)]
pub struct TsQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub expr: LexicalExpr,
}

impl TsQuery {
    pub fn is_match_all(&self) -> bool {
        self.expr.is_match_all()
    }

    /// `WHERE` condition for `vector_sql`; match-all queries match every row.
    pub fn condition(&self, vector_sql: &str) -> String {
        if self.is_match_all() {
            "TRUE".to_string()
        } else {
            format!("{vector_sql} @@ {}", self.sql)
        }
    }
}

/// Table layout a hybrid query runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSpec {
    pub table: String,
    pub id_column: String,
    pub fields: Vec<(String, FieldWeight)>,
    pub embedding_column: String,
    #[serde(default)]
    pub exact_match_column: Option<String>,
}

/// Complete hybrid query: SQL plus parameters in placeholder order.
#[derive(Debug, Clone, Serialize)]
pub struct HybridQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub lexical: LexicalExpr,
    pub text_weight: f32,
    pub vector_weight: f32,
    pub distance: DistanceMetric,
}

/// Builds full-text and hybrid SQL fragments.
#[derive(Debug, Clone)]
pub struct HybridQueryBuilder {
    config: SearchConfig,
    compiler: QueryCompiler,
}

impl HybridQueryBuilder {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let compiler = QueryCompiler::new(config.text.clone(), config.stemming);
        Ok(Self { config, compiler })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Normalize and compile search text.
    pub fn compile(&self, input: &str) -> Result<LexicalExpr> {
        text::check_size(input, &self.config.text)?;
        Ok(self.compiler.compile(input))
    }

    /// Compile raw bytes, rejecting invalid UTF-8.
    pub fn compile_bytes(&self, input: &[u8]) -> Result<LexicalExpr> {
        let decoded = text::decode(input, &self.config.text)?;
        Ok(self.compiler.compile(&decoded))
    }

    /// `setweight(to_tsvector('<lang>', coalesce(<column>, '')), '<W>')`
    pub fn ts_vector_sql(&self, column: &str, options: &TsVectorOptions) -> Result<String> {
        let column = check_identifier(column)?;
        let language = check_language(options.language.as_deref().unwrap_or(&self.config.language))?;
        let vector = format!("to_tsvector('{language}', coalesce({column}, ''))");
        Ok(match options.weight {
            Some(weight) => format!("setweight({vector}, '{}')", weight.as_char()),
            None => vector,
        })
    }

    /// `to_tsquery('<lang>', $n)` with the compiled query bound at `$n`.
    pub fn ts_query_sql(&self, input: &str, param_index: usize) -> Result<TsQuery> {
        if param_index == 0 {
            return Err(RsError::Validation("parameter index starts at 1".to_string()));
        }
        let expr = self.compile(input)?;
        if expr.is_match_all() {
            return Ok(TsQuery {
                sql: "''::tsquery".to_string(),
                params: Vec::new(),
                expr,
            });
        }
        Ok(TsQuery {
            sql: format!("to_tsquery('{}', ${param_index})", self.config.language),
            params: vec![SqlParam::Text(expr.to_tsquery())],
            expr,
        })
    }

    /// `ts_headline` over `column`, or the raw column when highlighting is off.
    pub fn highlight_sql(&self, column: &str, query_sql: &str) -> Result<String> {
        let column = check_identifier(column)?;
        let hl = &self.config.highlight;
        if !hl.enabled {
            return Ok(column.to_string());
        }
        Ok(format!(
            "ts_headline('{}', {column}, {query_sql}, 'MaxWords={}, MinWords={}, MaxFragments={}')",
            self.config.language, hl.max_words, hl.min_words, hl.max_fragments
        ))
    }

    /// `ts_rank_cd(<vector>, <query>, <normalization>)`, or `1` when ranking is off.
    pub fn ranking_sql(&self, vector_sql: &str, query_sql: &str) -> String {
        if self.config.ranking.enabled {
            format!(
                "ts_rank_cd({vector_sql}, {query_sql}, {})",
                self.config.ranking.normalization
            )
        } else {
            "1".to_string()
        }
    }

    /// Weighted vectors for several columns joined with `||`.
    pub fn combined_ts_vector_sql(&self, fields: &[(String, FieldWeight)]) -> Result<String> {
        if fields.is_empty() {
            return Err(RsError::Validation("at least one search field is required".to_string()));
        }
        let parts = fields
            .iter()
            .map(|(column, weight)| self.ts_vector_sql(column, &TsVectorOptions::weighted(*weight)))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(" || "))
    }

    /// Scored SELECT over the lexical leg alone, used when no embedding is
    /// available. Same output columns as [`Self::hybrid_sql`].
    pub fn lexical_sql(&self, input: &str, spec: &HybridSpec) -> Result<HybridQuery> {
        let table = check_identifier(&spec.table)?;
        let id = check_identifier(&spec.id_column)?;
        let vector_sql = format!("({})", self.combined_ts_vector_sql(&spec.fields)?);
        let query = self.ts_query_sql(input, 1)?;
        let rank_sql = self.ranking_sql(&vector_sql, &query.sql);
        let limit = self.config.hybrid.max_results;

        let sql = format!(
            "SELECT {id} AS id, {rank_sql} AS lexical_score, 0 AS vector_score, {rank_sql} AS score\n\
             FROM {table}\n\
             WHERE {condition}\n\
             ORDER BY score DESC\n\
             LIMIT {limit}",
            condition = query.condition(&vector_sql),
        );

        Ok(HybridQuery {
            sql,
            params: query.params,
            lexical: query.expr,
            text_weight: 1.0,
            vector_weight: 0.0,
            distance: self.config.hybrid.distance,
        })
    }

    /// Scored SELECT combining a lexical leg and a vector leg.
    ///
    /// Each leg is capped at `max_results` before the join. Rows missing from
    /// one leg score 0 there. Vector matches below `similarity_threshold` are
    /// dropped.
    pub fn hybrid_sql(&self, input: &str, embedding: &[f32], spec: &HybridSpec) -> Result<HybridQuery> {
        validate_vector("query", embedding)?;
        let hybrid = &self.config.hybrid;
        validate_weights(hybrid.text_weight, hybrid.vector_weight)?;

        let table = check_identifier(&spec.table)?;
        let id = check_identifier(&spec.id_column)?;
        let embedding_column = check_identifier(&spec.embedding_column)?;
        let vector_sql = self.combined_ts_vector_sql(&spec.fields)?;

        let query = self.ts_query_sql(input, 1)?;
        let mut params = query.params.clone();

        params.push(SqlParam::Vector(embedding.to_vec()));
        let distance_sql = format!("{embedding_column} {} ${}::vector", hybrid.distance.operator(), params.len());
        let similarity_sql = hybrid.distance.similarity_sql(&distance_sql);

        let exact_sql = match (&spec.exact_match_column, hybrid.boost_exact_matches) {
            (Some(column), true) if !query.is_match_all() => {
                let column = check_identifier(column)?;
                params.push(SqlParam::Text(text::collapse_whitespace(&text::strip_tags(input))));
                format!("lower({column}) = lower(${})", params.len())
            }
            _ => "FALSE".to_string(),
        };

        let rank_sql = self.ranking_sql(&format!("({vector_sql})"), &query.sql);
        let limit = hybrid.max_results;
        let mut sql = String::new();
        let _ = write!(
            sql,
            "WITH lexical AS (\n    \
             SELECT {id} AS id, {rank_sql} AS lexical_score, {exact_sql} AS exact_match\n    \
             FROM {table}\n    \
             WHERE {condition}\n    \
             ORDER BY lexical_score DESC\n    \
             LIMIT {limit}\n\
             ),\n\
             semantic AS (\n    \
             SELECT {id} AS id, {similarity_sql} AS vector_score\n    \
             FROM {table}\n    \
             WHERE {similarity_sql} >= {threshold}\n    \
             ORDER BY {distance_sql}\n    \
             LIMIT {limit}\n\
             )\n\
             SELECT COALESCE(lexical.id, semantic.id) AS id,\n       \
             COALESCE(lexical.lexical_score, 0) AS lexical_score,\n       \
             COALESCE(semantic.vector_score, 0) AS vector_score,\n       \
             {tw} * COALESCE(lexical.lexical_score, 0) + {vw} * COALESCE(semantic.vector_score, 0)\n       \
             + CASE WHEN COALESCE(lexical.exact_match, FALSE) THEN {boost} ELSE 0 END AS score\n\
             FROM lexical\n\
             FULL OUTER JOIN semantic ON lexical.id = semantic.id\n\
             ORDER BY score DESC\n\
             LIMIT {limit}",
            condition = query.condition(&format!("({vector_sql})")),
            threshold = hybrid.similarity_threshold,
            tw = hybrid.text_weight,
            vw = hybrid.vector_weight,
            boost = EXACT_MATCH_BOOST,
        );

        tracing::debug!(
            terms = %query.expr,
            params = params.len(),
            distance = hybrid.distance.as_str(),
            "built hybrid query"
        );

        Ok(HybridQuery {
            sql,
            params,
            lexical: query.expr,
            text_weight: hybrid.text_weight,
            vector_weight: hybrid.vector_weight,
            distance: hybrid.distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn builder() -> HybridQueryBuilder {
        HybridQueryBuilder::new(SearchConfig::default()).unwrap()
    }

    fn spec() -> HybridSpec {
        HybridSpec {
            table: "documents".to_string(),
            id_column: "id".to_string(),
            fields: vec![
                ("title".to_string(), FieldWeight::A),
                ("body".to_string(), FieldWeight::C),
            ],
            embedding_column: "embedding".to_string(),
            exact_match_column: Some("title".to_string()),
        }
    }

    #[test]
    fn weights_must_sum_to_one() {
        assert!(validate_weights(0.6, 0.4).is_ok());
        assert!(validate_weights(0.695, 0.3).is_ok());
        let err = validate_weights(0.5, 0.6).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidWeights);
        assert!(validate_weights(1.2, -0.2).is_err());
        assert!(validate_weights(f32::NAN, 1.0).is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SearchConfig::default();
        config.hybrid.vector_weight = 0.9;
        assert!(HybridQueryBuilder::new(config).is_err());

        let config = SearchConfig {
            language: "klingon".to_string(),
            ..Default::default()
        };
        assert!(HybridQueryBuilder::new(config).is_err());
    }

    #[test]
    fn ts_vector_with_weight() {
        let sql = builder()
            .ts_vector_sql("title", &TsVectorOptions::weighted(FieldWeight::A))
            .unwrap();
        assert_eq!(sql, "setweight(to_tsvector('english', coalesce(title, '')), 'A')");
    }

    #[test]
    fn ts_vector_rejects_bad_identifiers_and_languages() {
        let b = builder();
        assert!(b.ts_vector_sql("title; DROP TABLE x", &TsVectorOptions::default()).is_err());
        assert!(b.ts_vector_sql("docs.title", &TsVectorOptions::default()).is_ok());
        let options = TsVectorOptions {
            weight: None,
            language: Some("english'); --".to_string()),
        };
        assert!(b.ts_vector_sql("title", &options).is_err());
    }

    #[test]
    fn ts_query_binds_compiled_text() {
        let query = builder().ts_query_sql(r#""hello world" foo"#, 3).unwrap();
        assert_eq!(query.sql, "to_tsquery('english', $3)");
        assert_eq!(
            query.params,
            vec![SqlParam::Text("(hello <-> world) & foo:*".to_string())]
        );
        assert_eq!(query.condition("v"), "v @@ to_tsquery('english', $3)");
    }

    #[test]
    fn empty_query_matches_everything() {
        let query = builder().ts_query_sql("   ", 1).unwrap();
        assert!(query.is_match_all());
        assert!(query.params.is_empty());
        assert_eq!(query.condition("v"), "TRUE");
    }

    #[test]
    fn oversized_query_fails_validation() {
        let mut config = SearchConfig::default();
        config.text.max_content_bytes = 16;
        let b = HybridQueryBuilder::new(config).unwrap();
        let err = b.ts_query_sql("this query is definitely too long", 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ContentTooLarge);
        assert!(b.compile_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn highlight_and_ranking_toggle() {
        let b = builder();
        assert_eq!(
            b.highlight_sql("body", "q").unwrap(),
            "ts_headline('english', body, q, 'MaxWords=35, MinWords=15, MaxFragments=3')"
        );
        assert_eq!(b.ranking_sql("v", "q"), "ts_rank_cd(v, q, 32)");

        let mut config = SearchConfig::default();
        config.highlight.enabled = false;
        config.ranking.enabled = false;
        let b = HybridQueryBuilder::new(config).unwrap();
        assert_eq!(b.highlight_sql("body", "q").unwrap(), "body");
        assert_eq!(b.ranking_sql("v", "q"), "1");
    }

    #[test]
    fn combined_vectors_join_with_concat() {
        let sql = builder().combined_ts_vector_sql(&spec().fields).unwrap();
        assert_eq!(
            sql,
            "setweight(to_tsvector('english', coalesce(title, '')), 'A') || \
             setweight(to_tsvector('english', coalesce(body, '')), 'C')"
        );
        assert!(builder().combined_ts_vector_sql(&[]).is_err());
    }

    #[test]
    fn hybrid_sql_binds_text_vector_and_exact_match() {
        let query = builder().hybrid_sql("rust search", &[0.1, 0.2], &spec()).unwrap();
        assert_eq!(query.params.len(), 3);
        assert_eq!(query.params[0], SqlParam::Text("rust:* & search:*".to_string()));
        assert_eq!(query.params[1], SqlParam::Vector(vec![0.1, 0.2]));
        assert_eq!(query.params[2], SqlParam::Text("rust search".to_string()));
        assert!(query.sql.contains("embedding <=> $2::vector"));
        assert!(query.sql.contains("lower(title) = lower($3)"));
        assert!(query.sql.contains("FULL OUTER JOIN semantic"));
        assert!(query.sql.contains("0.7 * COALESCE(lexical.lexical_score, 0)"));
        assert!(query.sql.contains(">= 0.5"));
        assert_eq!(query.sql.matches("LIMIT 100").count(), 3);
    }

    #[test]
    fn hybrid_sql_without_text_uses_first_placeholder_for_vector() {
        let mut config = SearchConfig::default();
        config.hybrid.distance = DistanceMetric::L2;
        let b = HybridQueryBuilder::new(config).unwrap();
        let query = b.hybrid_sql("", &[1.0], &spec()).unwrap();
        assert_eq!(query.params, vec![SqlParam::Vector(vec![1.0])]);
        assert!(query.sql.contains("embedding <-> $1::vector"));
        assert!(query.sql.contains("WHERE TRUE"));
        assert!(query.sql.contains("FALSE AS exact_match"));
    }

    #[test]
    fn hybrid_sql_rejects_bad_embedding() {
        let err = builder().hybrid_sql("rust", &[], &spec()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEmbedding);
        assert!(builder().hybrid_sql("rust", &[f32::INFINITY], &spec()).is_err());
    }

    #[test]
    fn lexical_sql_has_no_vector_leg() {
        let query = builder().lexical_sql("rust", &spec()).unwrap();
        assert_eq!(query.params, vec![SqlParam::Text("rust:*".to_string())]);
        assert!(!query.sql.contains("::vector"));
        assert!(query.sql.contains("@@ to_tsquery('english', $1)"));
        assert!((query.vector_weight).abs() < f32::EPSILON);
    }

    #[test]
    fn vector_param_bind_format() {
        assert_eq!(SqlParam::Vector(vec![0.5, -1.0, 2.0]).to_bind_string(), "[0.5,-1,2]");
    }

    #[test]
    fn field_weight_parse() {
        assert_eq!(FieldWeight::parse("b"), Some(FieldWeight::B));
        assert_eq!(FieldWeight::parse("E"), None);
    }
}
