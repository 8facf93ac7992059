//! Build automation tasks for EMLX
//!
//! Currently generates the CLI reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for EMLX", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<emlx_cli::Cli>();

    let content = format!(
        r#"# EMLX CLI Reference

Generated from the CLI source on {}.

## Overview

`emlx` turns repository metadata records into EML 2.2.0 documents and publishes
them, together with their data files and an OAI-ORE resource map, as packages on a
DataONE member node. `emlx-ingest download` fetches the data files beforehand.

## Typical Run

```bash
# Fetch the published files of every record
emlx-ingest download --records records.json --data-root data

# Check the generated documents offline
emlx convert

# Publish; safe to re-run after an interruption
emlx upload
```

## Commands

{}

## Configuration

Settings are read from `~/.config/emlx/config.toml` (or `--config`) and can be
overridden with `EMLX_*` environment variables. The member node token is read from
`EMLX_TOKEN` or the first line of `~/.config/emlx/.d1_token`.

```toml
rightsholder_orcid = "http://orcid.org/0000-0002-1825-0097"
node_id = "urn:node:EXAMPLE"
mn_url = "https://mn.example.org/metacat/d1/mn"
metadata_json = "records.json"
data_root = "data"
work_dir = "work"
write_groups = ["CN=editors,DC=dataone,DC=org"]

[retry]
max_attempts = 3
base_delay_ms = 500
```

Logging is controlled by `EMLX_LOG_LEVEL`, `EMLX_LOG_FORMAT`, `EMLX_LOG_OUTPUT`,
`EMLX_LOG_DIR` and `EMLX_LOG_FILTER`.

---

*To update this file, run `cargo run --manifest-path xtask/Cargo.toml -- generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
