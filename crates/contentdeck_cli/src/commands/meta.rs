use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use console::style;

use crate::Cli;

const BIN_NAME: &str = "contentdeck";

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
    dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Cli::command();
    match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = clap_complete::generate_to(shell, &mut cmd, BIN_NAME, dir)?;
            println!("Wrote {} completions to {}", shell, style(path.display()).cyan());
        }
        None => {
            let mut out = Vec::new();
            clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut out);
            std::io::stdout().write_all(&out)?;
        }
    }
    Ok(())
}

pub(crate) fn handle_man(output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(dir) = output else {
        let mut out = Vec::new();
        clap_mangen::Man::new(Cli::command()).render(&mut out)?;
        std::io::stdout().write_all(&out)?;
        return Ok(());
    };

    for page in write_man_pages(dir)? {
        println!("  {}", style(page.display()).dim());
    }
    println!("Man pages written to {}", dir.display());
    Ok(())
}

/// Render `contentdeck.1` plus one page per subcommand, returning the files.
fn write_man_pages(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    clap_mangen::generate_to(Cli::command(), dir)?;

    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BIN_NAME) && n.ends_with(".1"))
        })
        .collect();
    pages.sort();
    Ok(pages)
}
