use std::path::Path;

use contentdeck::Article;
use contentdeck::articles::{normalize_filename, parse_frontmatter, render_document};
use serde::Serialize;
use tabled::Tabled;

use crate::ArticlesAction;
use crate::commands::deploy::commit;
use crate::commands::shared::{
    Context, OutputFormat, print_json, print_rows, success, truncate, warning,
};

#[derive(Debug, Serialize, Tabled)]
pub(crate) struct ArticleRow {
    #[tabled(rename = "File")]
    pub filename: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Words")]
    pub words: usize,
}

impl From<&Article> for ArticleRow {
    fn from(article: &Article) -> Self {
        Self {
            filename: article.filename.clone(),
            title: truncate(article.title().unwrap_or("(untitled)"), 48),
            words: article.body.split_whitespace().count(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ArticleRecord<'a> {
    filename: &'a str,
    path: &'a str,
    sha: Option<&'a str>,
    frontmatter: &'a serde_yaml::Mapping,
    body: &'a str,
}

/// Handle `contentdeck articles`.
pub(crate) async fn handle_articles(
    action: ArticlesAction,
    ctx: &Context,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ArticlesAction::List { output } => {
            load(ctx).await?;
            print_articles(&ctx.articles.all(), output);
        }
        ArticlesAction::Show { filename } => {
            load(ctx).await?;
            let article = ctx
                .articles
                .get(&filename)
                .ok_or_else(|| format!("Article '{}' not found", normalize_filename(&filename)))?;
            print!("{}", render_document(&article.frontmatter, &article.body)?);
        }
        ArticlesAction::Search { query, output } => {
            load(ctx).await?;
            print_articles(&ctx.articles.search(&query), output);
        }
        ArticlesAction::Save {
            file,
            name,
            commit: opts,
        } => {
            let filename = match name {
                Some(name) => name,
                None => file_name(&file)?,
            };
            let text = std::fs::read_to_string(&file)?;
            let (frontmatter, body) = parse_frontmatter(&text);
            if frontmatter.is_empty() {
                warning(format!("{} has no frontmatter", file.display()));
            }

            let save = async {
                ctx.articles
                    .save(&filename, frontmatter, body, ctx.lock_metadata())
                    .await
                    .inspect_err(|e| {
                        if e.is_conflict() {
                            warning(
                                "The article changed on GitHub; fetch it again and reapply your edit",
                            );
                        }
                    })
            };
            let article = commit(ctx, save, opts.deploy).await?;
            success(format!("Saved {}", article.path));
        }
        ArticlesAction::Delete {
            filename,
            commit: opts,
        } => {
            commit(
                ctx,
                ctx.articles.delete(&filename, ctx.lock_metadata()),
                opts.deploy,
            )
            .await?;
            success(format!("Deleted article {}", normalize_filename(&filename)));
        }
    }

    Ok(())
}

async fn load(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let report = ctx.articles.load().await?;
    if report.failed > 0 {
        warning(format!("{} article(s) could not be read", report.failed));
    }
    Ok(())
}

fn print_articles(articles: &[Article], output: OutputFormat) {
    match output {
        OutputFormat::Table => {
            let rows: Vec<ArticleRow> = articles.iter().map(ArticleRow::from).collect();
            print_rows(&rows, output);
        }
        OutputFormat::Json => {
            let records: Vec<ArticleRecord<'_>> = articles
                .iter()
                .map(|a| ArticleRecord {
                    filename: &a.filename,
                    path: &a.path,
                    sha: a.sha.as_deref(),
                    frontmatter: &a.frontmatter,
                    body: &a.body,
                })
                .collect();
            print_json(&records);
        }
    }
}

fn file_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("Cannot derive an article name from {}", path.display()).into())
}
