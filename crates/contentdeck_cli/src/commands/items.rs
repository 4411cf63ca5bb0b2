use std::path::Path;

use contentdeck::Item;
use serde::Serialize;
use serde_yaml::Mapping;
use tabled::Tabled;

use crate::ItemsAction;
use crate::commands::deploy::commit;
use crate::commands::shared::{
    Context, OutputFormat, print_json, print_rows, success, truncate, warning,
};

/// One item as a table row.
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct ItemRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Path")]
    pub path: String,
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            title: truncate(item.title(), 48),
            date: item.str_field("date").unwrap_or("-").to_string(),
            path: item.path.clone(),
        }
    }
}

/// Full item record for JSON output.
#[derive(Debug, Serialize)]
struct ItemRecord<'a> {
    id: &'a str,
    path: &'a str,
    sha: Option<&'a str>,
    fields: &'a Mapping,
}

impl<'a> From<&'a Item> for ItemRecord<'a> {
    fn from(item: &'a Item) -> Self {
        Self {
            id: &item.id,
            path: &item.path,
            sha: item.sha.as_deref(),
            fields: &item.fields,
        }
    }
}

/// Handle `contentdeck items`.
pub(crate) async fn handle_items(
    action: ItemsAction,
    ctx: &Context,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ItemsAction::List { output } => {
            load(ctx).await?;
            print_items(&ctx.items.all(), output);
        }
        ItemsAction::Show { id } => {
            load(ctx).await?;
            let item = ctx
                .items
                .get(&id)
                .ok_or_else(|| format!("Item '{}' not found", id))?;
            print!("{}", serde_yaml::to_string(&item.fields)?);
        }
        ItemsAction::Search { query, output } => {
            load(ctx).await?;
            print_items(&ctx.items.search(&query), output);
        }
        ItemsAction::Validate { file } => {
            let fields = read_fields(&file)?;
            load(ctx).await?;
            let errors = ctx.items.validate(&fields);
            if !errors.is_empty() {
                for error in &errors {
                    warning(error);
                }
                return Err(format!("{} has {} problem(s)", file.display(), errors.len()).into());
            }
            success(format!("{} is valid", file.display()));
        }
        ItemsAction::Save { file, commit: opts } => {
            let fields = read_fields(&file)?;
            let save = async {
                ctx.items
                    .save(fields, ctx.lock_metadata())
                    .await
                    .inspect_err(|e| {
                        if e.is_conflict() {
                            warning(
                                "The item changed on GitHub; fetch it again and reapply your edit",
                            );
                        }
                    })
            };
            let item = commit(ctx, save, opts.deploy).await?;
            success(format!(
                "Saved {} ({})",
                item.path,
                item.sha.as_deref().unwrap_or("no sha")
            ));
        }
        ItemsAction::Delete { id, commit: opts } => {
            commit(ctx, ctx.items.delete(&id, ctx.lock_metadata()), opts.deploy).await?;
            success(format!("Deleted item {}", id));
        }
    }

    Ok(())
}

async fn load(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let report = ctx.items.load().await?;
    if report.failed > 0 {
        warning(format!("{} item file(s) could not be read", report.failed));
    }
    tracing::debug!(loaded = report.loaded, failed = report.failed, "Items loaded");
    Ok(())
}

fn print_items(items: &[Item], output: OutputFormat) {
    match output {
        OutputFormat::Table => {
            let rows: Vec<ItemRow> = items.iter().map(ItemRow::from).collect();
            print_rows(&rows, output);
        }
        OutputFormat::Json => {
            let records: Vec<ItemRecord<'_>> = items.iter().map(ItemRecord::from).collect();
            print_json(&records);
        }
    }
}

fn read_fields(path: &Path) -> Result<Mapping, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    parse_fields(&text).map_err(|e| format!("{}: {}", path.display(), e).into())
}

fn parse_fields(text: &str) -> Result<Mapping, serde_yaml::Error> {
    serde_yaml::from_str(text)
}

#[cfg(test)]
mod tests {
    use serde_yaml::Value;

    use super::*;

    fn item(yaml: &str) -> Item {
        let fields = parse_fields(yaml).unwrap();
        Item {
            id: "deck-1".to_string(),
            path: "data/archive/items/deck-1.yml".to_string(),
            sha: Some("abc".to_string()),
            fields,
        }
    }

    #[test]
    fn row_uses_title_and_date() {
        let row = ItemRow::from(&item("id: deck-1\ntitle: Mono Red\ndate: 2024-05-01\n"));
        assert_eq!(row.title, "Mono Red");
        assert_eq!(row.date, "2024-05-01");
    }

    #[test]
    fn row_tolerates_missing_date() {
        let row = ItemRow::from(&item("id: deck-1\ntitle: Mono Red\n"));
        assert_eq!(row.date, "-");
    }

    #[test]
    fn record_serializes_fields_as_json() {
        let item = item("id: deck-1\ntitle: Mono Red\ntags: [aggro]\n");
        let json = serde_json::to_value(ItemRecord::from(&item)).unwrap();
        assert_eq!(json["fields"]["tags"][0], "aggro");
        assert_eq!(json["sha"], "abc");
    }

    #[test]
    fn parse_fields_requires_a_mapping() {
        assert!(parse_fields("- just\n- a list\n").is_err());
        let fields = parse_fields("id: x\n").unwrap();
        assert_eq!(fields.get("id"), Some(&Value::String("x".to_string())));
    }
}
