use clap::Parser;
use gridbook::downloader::to_csv;
use gridbook::grid::{CommitOutcome, RenderedCell, RenderedRow};
use gridbook::record::Field;
use gridbook::saving::{load_sheet, save_sheet};
use gridbook::{Config, Editor, Screen, SeedPhase, seed_store};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

lazy_static! {
    static ref EDIT_REGEX: Regex = Regex::new(r"^edit\s+(\d+)\s+(\w+)\s?(.*)$").unwrap();
    static ref SET_REGEX: Regex = Regex::new(r"^set\s+(\w+)\s?(.*)$").unwrap();
    static ref ROW_REGEX: Regex = Regex::new(r"^(scroll_to|select)\s+(\d+)$").unwrap();
    static ref TEXT_REGEX: Regex = Regex::new(r"^(search|title)(?:\s(.*))?$").unwrap();
    static ref FILE_REGEX: Regex = Regex::new(r"^(export|save|load)\s+(\S+)$").unwrap();
}

/// Edit the sheet from a terminal.
#[derive(Parser, Debug)]
#[command(name = "gridbook", version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let config = Cli::parse().config;

    let store = Arc::new(config.open_store());
    let mut editor = Editor::from_config(store.clone(), &config);

    if config.no_seed || !store.is_empty() {
        editor.set_seed_phase(SeedPhase::Abandoned);
    } else {
        println!("{}", gridbook::editor::LOADING_TEXT);
        let runtime = tokio::runtime::Runtime::new()?;
        let source = config.dataset_source();
        let phase = runtime.block_on(seed_store(store, &source, |_| {}));
        editor.set_seed_phase(phase);
    }

    if editor.screen() == Screen::Error {
        println!("{}", gridbook::editor::ERROR_TITLE);
        println!("{}", gridbook::editor::ERROR_MESSAGE);
        return Ok(());
    }

    let mut start_time = Instant::now();
    let mut status = String::from("ok");
    let mut show = true;
    loop {
        editor.tick(Instant::now());
        if show {
            display(&editor);
        }

        print!("[{:.1}] ({}) > ", start_time.elapsed().as_secs_f64(), status);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        start_time = Instant::now();

        if command == "q" {
            break;
        }
        status = match run_command(&mut editor, &config, command, &mut show) {
            Ok(message) => message,
            Err(message) => message,
        };
    }

    Ok(())
}

/// Executes one command line and returns the status to show in the prompt.
fn run_command(
    editor: &mut Editor,
    config: &Config,
    command: &str,
    show: &mut bool,
) -> Result<String, String> {
    let page = (editor.grid().viewport().height / editor.grid().viewport().row_height).max(1) as i64;

    match command {
        "" => return Err("invalid command".to_string()),
        "help" => {
            print_help();
            return Ok("ok".to_string());
        }
        "w" => editor.grid_mut().scroll_by_rows(-page),
        "s" => editor.grid_mut().scroll_by_rows(page),
        "add" => {
            editor.press_add_row();
            editor.tick(Instant::now());
            let last = editor.grid().row_count().saturating_sub(1);
            let offset = editor.grid().viewport().total_size(last + 1);
            editor.grid_mut().scroll_to(offset);
        }
        "commit" => {
            return match editor.grid_mut().commit_draft() {
                Ok(CommitOutcome::Committed(_)) => Ok("ok".to_string()),
                Ok(CommitOutcome::Rejected(errors)) => Err(format!("{} invalid fields", errors.len())),
                Ok(CommitOutcome::NoDraft) => Err("no row being added".to_string()),
                Err(e) => Err(e.to_string()),
            };
        }
        "discard" => editor.grid_mut().discard_draft(),
        "select_all" => editor.grid_mut().toggle_select_all(),
        "reload" => editor.reload(),
        "disable_output" => *show = false,
        "enable_output" => *show = true,
        _ => return run_argument_command(editor, config, command),
    }
    Ok("ok".to_string())
}

fn run_argument_command(editor: &mut Editor, config: &Config, command: &str) -> Result<String, String> {
    if let Some(caps) = EDIT_REGEX.captures(command) {
        let number: usize = caps[1].parse().map_err(|_| "invalid row")?;
        let field: Field = caps[2].parse()?;
        let key = number
            .checked_sub(1)
            .and_then(|index| editor.grid().row_at(index))
            .map(|row| row.key)
            .ok_or("invalid row")?;
        let errors = editor
            .grid_mut()
            .edit_cell(key, field, &caps[3])
            .map_err(|e| e.to_string())?;
        return match errors.get(&field) {
            Some(message) => Err(message.clone()),
            None => Ok("ok".to_string()),
        };
    }

    if let Some(caps) = SET_REGEX.captures(command) {
        let field: Field = caps[1].parse()?;
        return if editor.grid_mut().edit_draft(field, &caps[2]) {
            Ok("ok".to_string())
        } else {
            Err("no row being added".to_string())
        };
    }

    if let Some(caps) = ROW_REGEX.captures(command) {
        let number: usize = caps[2].parse().map_err(|_| "invalid row")?;
        let index = number.checked_sub(1).ok_or("invalid row")?;
        if &caps[1] == "scroll_to" {
            let offset = editor.grid().viewport().total_size(index);
            editor.grid_mut().scroll_to(offset);
        } else {
            let key = editor.grid().row_at(index).map(|row| row.key).ok_or("invalid row")?;
            editor.grid_mut().toggle_select(key);
        }
        return Ok("ok".to_string());
    }

    if let Some(caps) = TEXT_REGEX.captures(command) {
        let text = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if &caps[1] == "search" {
            if !editor.shell().search_open() {
                editor.toggle_search();
            }
            editor.edit_search(text);
            // A submitted line is already a settled input.
            editor.tick(Instant::now() + config.debounce());
        } else {
            editor.edit_title(text).map_err(|e| e.to_string())?;
        }
        return Ok("ok".to_string());
    }

    if let Some(caps) = FILE_REGEX.captures(command) {
        let path = &caps[2];
        let result = match &caps[1] {
            "export" => std::fs::write(path, to_csv(editor.grid().displayed_rows())).map_err(|e| e.to_string()),
            "save" => save_sheet(editor.store(), path).map_err(|e| e.to_string()),
            _ => load_sheet(editor.store(), path).map_err(|e| e.to_string()).map(|()| editor.reload()),
        };
        return result.map(|()| "ok".to_string());
    }

    Err("invalid command".to_string())
}

fn print_help() {
    println!("Commands:");
    println!("  q: Quit");
    println!("  w: Move up one page");
    println!("  s: Move down one page");
    println!("  scroll_to <row>: Scroll to the specified row");
    println!("  edit <row> <field> <value>: Change one cell of a row");
    println!("  add: Start a new row at the bottom of the table");
    println!("  set <field> <value>: Change one cell of the new row");
    println!("  commit: Validate and store the new row");
    println!("  discard: Drop the new row");
    println!("  select <row>: Toggle the row's checkbox");
    println!("  select_all: Toggle every displayed row");
    println!("  search [text]: Show only rows containing the text");
    println!("  title [text]: Rename the sheet");
    println!("  export <file.csv>: Write the displayed rows as CSV");
    println!("  save <file> / load <file>: Store or restore a compressed snapshot");
    println!("  reload: Re-read the sheet from storage");
    println!("  disable_output / enable_output: Toggle the table display");
    println!("Fields: {}", Field::ALL.map(Field::key).join(", "));
}

fn display(editor: &Editor) {
    let view = editor.view();
    println!();
    println!("== {} ==", view.title);
    if let Some(warning) = view.warning {
        println!("!! {}", warning);
    }
    if view.search_open {
        println!("search: {}", view.search_input);
    }

    let window = editor.grid().render_window();
    print!("{} {:>6} ", if window.all_selected { "[x]" } else { "[ ]" }, "#");
    for field in Field::ALL {
        print!("{:<width$} ", field.title(), width = field.width() as usize);
    }
    println!();

    let mut errors = Vec::new();
    for row in &window.rows {
        match row {
            RenderedRow::Data { number, selected, cells, .. } => {
                print!("{} {:>6} ", if *selected { "[x]" } else { "[ ]" }, number);
                print_cells(cells, &mut errors, &number.to_string());
            }
            RenderedRow::AddRow { draft: Some(cells), .. } => {
                print!("{:>10} ", "new");
                print_cells(cells, &mut errors, "new");
            }
            RenderedRow::AddRow { draft: None, .. } => println!("{:>10} + Add row", ""),
        }
    }

    println!(
        "rows {}, offset {} of {}",
        window.row_count - 1,
        window.scroll_offset,
        window.total_size
    );
    for error in errors {
        println!("  {}", error);
    }
}

fn print_cells(cells: &[RenderedCell], errors: &mut Vec<String>, label: &str) {
    for cell in cells {
        let width = cell.field.width() as usize;
        let mut text: String = cell.text.chars().take(width - 1).collect();
        if cell.error.is_some() {
            text.push('*');
        }
        print!("{:<width$} ", text, width = width);
        if let Some(message) = &cell.error {
            errors.push(format!("{} {}: {}", label, cell.field, message));
        }
    }
    println!();
}
