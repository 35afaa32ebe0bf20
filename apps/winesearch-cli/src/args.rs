use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use winesearch_core::query::{MatchMode, SearchParams, SearchRequest, SortBy};
use winesearch_core::types::BackendKind;

pub const USAGE: &str = "\
Usage:
  winesearch ingest <backend> [file|dir] [--limit N]
  winesearch query  <backend> [terms...] [query options]
  winesearch run    <backend> [file|dir] [--limit N] [terms...] [query options]
  winesearch schema <backend>

Backends: graph, search, keyword, vector, columnar

Query options:
  --country C      --max-price P    --min-points N
  --limit N        --offset N       --cursor TOKEN
  --mode auto|fulltext|semantic|hybrid   --alpha A (hybrid vector weight)
  --sort relevance|points
  --explain        print the backend's native query before the results";

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i).map(String::as_str).ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn number<T: FromStr>(args: &[String], i: &mut usize, flag: &str) -> Result<T> {
    let raw = value(args, i, flag)?;
    raw.parse().map_err(|_| anyhow!("{flag} requires a number, got '{raw}'"))
}

pub fn backend(args: &[String]) -> Result<BackendKind> {
    let name = args.first().ok_or_else(|| anyhow!("missing backend\n\n{USAGE}"))?;
    name.parse().with_context(|| format!("'{name}' is not a backend"))
}

#[derive(Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub params: SearchParams,
    pub mode: MatchMode,
    pub sort: SortBy,
    pub alpha: Option<f32>,
    pub explain: bool,
}

impl QueryOptions {
    /// The canonical request; a hybrid mode without `--alpha` takes the
    /// configured weight.
    pub fn request(&self, hybrid_alpha: f32) -> SearchRequest {
        let mode = match self.mode {
            MatchMode::Hybrid { .. } => MatchMode::Hybrid { alpha: self.alpha.unwrap_or(hybrid_alpha) },
            other => other,
        };
        SearchRequest::from(self.params.clone()).mode(mode).sort(self.sort)
    }

    /// Consumes a query flag at `args[*i]`. Returns false when the flag is not
    /// a query option.
    fn take(&mut self, args: &[String], i: &mut usize) -> Result<bool> {
        let flag = args[*i].as_str();
        match flag {
            "--country" => self.params.country = Some(value(args, i, flag)?.to_string()),
            "--max-price" => self.params.max_price = Some(number(args, i, flag)?),
            "--min-points" => self.params.min_points = Some(number(args, i, flag)?),
            "--limit" => self.params.limit = Some(number(args, i, flag)?),
            "--offset" => self.params.offset = Some(number(args, i, flag)?),
            "--cursor" => self.params.cursor = Some(value(args, i, flag)?.to_string()),
            "--explain" => self.explain = true,
            "--alpha" => self.alpha = Some(number(args, i, flag)?),
            "--mode" => {
                self.mode = match value(args, i, flag)? {
                    "auto" => MatchMode::Auto,
                    "fulltext" | "full-text" => MatchMode::FullText,
                    "semantic" => MatchMode::Semantic,
                    "hybrid" => MatchMode::Hybrid { alpha: 0.0 },
                    other => bail!("unknown mode '{other}'"),
                }
            }
            "--sort" => {
                self.sort = match value(args, i, flag)? {
                    "relevance" => SortBy::Relevance,
                    "points" => SortBy::PointsDesc,
                    other => bail!("unknown sort '{other}'"),
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn push_term(&mut self, word: &str) {
        let terms = self.params.terms.get_or_insert_with(String::new);
        if !terms.is_empty() {
            terms.push(' ');
        }
        terms.push_str(word);
    }
}

#[derive(Debug, PartialEq)]
pub struct IngestArgs {
    pub backend: BackendKind,
    pub path: Option<PathBuf>,
    pub limit: Option<usize>,
}

impl IngestArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let backend = backend(args)?;
        let (mut path, mut limit) = (None, None);
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--limit" => limit = Some(number(args, &mut i, "--limit")?),
                a if !a.starts_with('-') && path.is_none() => path = Some(PathBuf::from(a)),
                a => bail!("unexpected argument '{a}'"),
            }
            i += 1;
        }
        Ok(Self { backend, path, limit })
    }
}

#[derive(Debug, PartialEq)]
pub struct QueryArgs {
    pub backend: BackendKind,
    pub options: QueryOptions,
}

impl QueryArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let backend = backend(args)?;
        let mut options = QueryOptions::default();
        let mut i = 1;
        while i < args.len() {
            if !options.take(args, &mut i)? {
                match args[i].as_str() {
                    a if a.starts_with("--") => bail!("unknown option '{a}'"),
                    word => options.push_term(word),
                }
            }
            i += 1;
        }
        Ok(Self { backend, options })
    }
}

/// `run`: the first positional after the backend is the input, later ones are
/// search terms. `--limit` bounds the query, `--ingest-limit` the input.
#[derive(Debug, PartialEq)]
pub struct RunArgs {
    pub ingest: IngestArgs,
    pub options: QueryOptions,
}

impl RunArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let backend = backend(args)?;
        let mut ingest = IngestArgs { backend, path: None, limit: None };
        let mut options = QueryOptions::default();
        let mut i = 1;
        while i < args.len() {
            if args[i] == "--ingest-limit" {
                ingest.limit = Some(number(args, &mut i, "--ingest-limit")?);
            } else if !options.take(args, &mut i)? {
                match args[i].as_str() {
                    a if a.starts_with("--") => bail!("unknown option '{a}'"),
                    a if ingest.path.is_none() => ingest.path = Some(PathBuf::from(a)),
                    word => options.push_term(word),
                }
            }
            i += 1;
        }
        Ok(Self { ingest, options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn query_options_and_terms() {
        let q = QueryArgs::parse(&argv("vector tuscany red --country Italy --max-price 50 --limit 3 --explain"))
            .unwrap();
        assert_eq!(q.backend, BackendKind::Vector);
        assert_eq!(q.options.params.terms.as_deref(), Some("tuscany red"));
        assert_eq!(q.options.params.country.as_deref(), Some("Italy"));
        assert_eq!(q.options.params.max_price, Some(50.0));
        assert_eq!(q.options.params.limit, Some(3));
        assert!(q.options.explain);
    }

    #[test]
    fn hybrid_takes_the_configured_alpha() {
        let q = QueryArgs::parse(&argv("vector cherry --mode hybrid")).unwrap();
        assert_eq!(q.options.request(0.7).mode, MatchMode::Hybrid { alpha: 0.7 });
        let q = QueryArgs::parse(&argv("vector cherry --mode hybrid --alpha 0.25")).unwrap();
        assert_eq!(q.options.request(0.7).mode, MatchMode::Hybrid { alpha: 0.25 });
    }

    #[test]
    fn run_splits_input_from_terms() {
        let r = RunArgs::parse(&argv("graph data/wines.jsonl --ingest-limit 100 red --sort points")).unwrap();
        assert_eq!(r.ingest.path, Some(PathBuf::from("data/wines.jsonl")));
        assert_eq!(r.ingest.limit, Some(100));
        assert_eq!(r.options.params.terms.as_deref(), Some("red"));
        assert_eq!(r.options.sort, SortBy::PointsDesc);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(IngestArgs::parse(&argv("mongo data")).is_err());
        assert!(QueryArgs::parse(&argv("graph --limit ten")).is_err());
        assert!(QueryArgs::parse(&argv("graph --bogus")).is_err());
        assert!(IngestArgs::parse(&[]).is_err());
    }
}
