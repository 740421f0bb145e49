//! Tree Visualization CLI Tool
//!
//! Parses a Markdown file and prints the tree notation of its AST;
//! with `--diff` it compares two files and prints the merged tree,
//! coloring inserted and deleted nodes on terminals.
//!
//! Usage:
//!   mdtree-treeviz <input-file> [options]
//!
//! Options:
//!   --diff <file>        Treat <file> as the old document and show changes
//!   --format <format>    Output format: treeviz (default), json
//!   --extensions <list>  Comma-separated extensions, or "all"
//!   --no-color           Plain output even on a terminal

use clap::{Arg, ArgAction, Command};
use std::fs;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use mdtree::api::{process, OutputFormat, ProcessArgs};
use mdtree::Options;

fn options_from_list(list: &str) -> Result<Options, String> {
    if list == "all" {
        return Ok(Options::all());
    }

    let mut opts = Options::default();
    for name in list.split(',').filter(|s| !s.is_empty()) {
        match name {
            "tables" => opts.tables = true,
            "fenced-code" => opts.fenced_code = true,
            "footnotes" => opts.footnotes = true,
            "autolink" => opts.autolink = true,
            "strikethrough" => opts.strikethrough = true,
            "superscript" => opts.superscript = true,
            "math" => opts.math = true,
            "math-explicit" => opts.math_explicit = true,
            "space-headers" => opts.space_headers = true,
            "no-intra-emphasis" => opts.no_intra_emphasis = true,
            "no-code-indent" => opts.no_code_indent = true,
            "metadata" => opts.metadata = true,
            "commonmark" => opts.commonmark = true,
            "definition-lists" => opts.definition_lists = true,
            "tasklists" => opts.tasklists = true,
            "callouts" => opts.callouts = true,
            "extended-attributes" => opts.extended_attributes = true,
            "highlight" => opts.highlight = true,
            "img-ext" => opts.img_ext = true,
            other => return Err(format!("unknown extension: {}", other)),
        }
    }
    Ok(opts)
}

/// Print a tree dump, coloring INSERT/DELETE lines.
fn print_colored(output: &str) -> std::io::Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("INSERT:") {
            stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        } else if trimmed.starts_with("DELETE:") {
            stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        }
        writeln!(stdout, "{}", line)?;
        stdout.reset()?;
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("mdtree-treeviz")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Markdown AST tree visualization and diffing")
        .arg(
            Arg::new("input")
                .help("Input Markdown file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("diff")
                .long("diff")
                .value_name("FILE")
                .help("Old document to compare the input against"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .help("Output format: treeviz, json")
                .default_value("treeviz"),
        )
        .arg(
            Arg::new("extensions")
                .long("extensions")
                .value_name("LIST")
                .help("Comma-separated extension names, or \"all\"")
                .default_value("all"),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored diff output")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let input = matches.get_one::<String>("input").unwrap();
    let content = String::from_utf8_lossy(&fs::read(input)?).into_owned();

    let old_content = match matches.get_one::<String>("diff") {
        Some(path) => Some(String::from_utf8_lossy(&fs::read(path)?).into_owned()),
        None => None,
    };

    let options = options_from_list(matches.get_one::<String>("extensions").unwrap())?;

    let format = match (
        matches.get_one::<String>("format").unwrap().as_str(),
        old_content.is_some(),
    ) {
        ("treeviz", false) => OutputFormat::Treeviz,
        ("treeviz", true) => OutputFormat::DiffTreeviz,
        ("json", false) => OutputFormat::AstJson,
        ("json", true) => OutputFormat::DiffJson,
        (other, _) => return Err(format!("unknown format: {}", other).into()),
    };

    let output = process(ProcessArgs {
        content,
        old_content,
        format: format.clone(),
        options,
    })?;

    let colorize = matches!(format, OutputFormat::DiffTreeviz)
        && !matches.get_flag("no-color")
        && atty::is(atty::Stream::Stdout);

    if colorize {
        print_colored(&output)?;
    } else {
        print!("{}", output);
        if !output.ends_with('\n') {
            println!();
        }
    }

    Ok(())
}
