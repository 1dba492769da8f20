//! Interactive folder browser.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};

use campusdrive_common::DriveItem;
use campusdrive_navigator::Navigator;
use campusdrive_tabular::{CellValue, Column, ColumnData, Table, XLSX_EXTENSION};

/// Rows shown when reading a spreadsheet.
const PREVIEW_ROWS: usize = 10;
const RULE_WIDTH: usize = 60;

/// Format a table as aligned text, showing at most `max_rows` rows.
pub fn render_table(table: &Table, max_rows: usize) -> String {
    if table.width() == 0 {
        return "(empty spreadsheet)\n".to_string();
    }

    let shown: Vec<Vec<String>> = table
        .rows()
        .take(max_rows)
        .map(|row| row.iter().map(CellValue::to_string).collect())
        .collect();
    let index_width = table.height().saturating_sub(1).to_string().len();
    let widths: Vec<usize> = table
        .column_names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            shown
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = format!("{:>w$}", "", w = index_width);
    for (name, width) in table.column_names().iter().zip(&widths) {
        out.push_str(&format!("  {:>w$}", name, w = width));
    }
    out.push('\n');
    for (index, row) in shown.iter().enumerate() {
        out.push_str(&format!("{:>w$}", index, w = index_width));
        for (cell, width) in row.iter().zip(&widths) {
            out.push_str(&format!("  {:>w$}", cell, w = width));
        }
        out.push('\n');
    }
    if table.height() > max_rows {
        out.push_str(&format!("... and {} more rows\n", table.height() - max_rows));
    }
    out
}

fn is_spreadsheet(item: &DriveItem) -> bool {
    item.is_file() && item.name.to_lowercase().ends_with(XLSX_EXTENSION)
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Menu-driven browser over a navigator.
///
/// Failures of individual actions are reported and the menu is shown
/// again; only a failed start-up ends the session with an error.
pub struct Console<R, W> {
    navigator: Navigator,
    input: R,
    output: W,
    /// Listing of the current folder in display order (folders first).
    items: Vec<DriveItem>,
    closed: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(navigator: Navigator, input: R, output: W) -> Self {
        Self {
            navigator,
            input,
            output,
            items: Vec::new(),
            closed: false,
        }
    }

    /// Give back the output, e.g. to inspect what was printed.
    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, line: impl AsRef<str>) -> Result<()> {
        writeln!(self.output, "{}", line.as_ref()).context("Failed to write output")
    }

    /// Ask for one line. Returns an empty answer once input is exhausted.
    fn ask(&mut self, label: &str) -> Result<String> {
        write!(self.output, "{}", label).context("Failed to write output")?;
        self.output.flush().context("Failed to write output")?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line).context("Failed to read input")?;
        if read == 0 {
            self.closed = true;
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Ask for a 1-based choice among `count` entries; returns the 0-based index.
    fn ask_choice(&mut self, label: &str, count: usize) -> Result<usize> {
        let answer = self.ask(label)?;
        let number: usize = answer
            .trim()
            .parse()
            .with_context(|| format!("'{}' is not a number", answer.trim()))?;
        if number == 0 || number > count {
            bail!("Choose a number between 1 and {}", count);
        }
        Ok(number - 1)
    }

    fn ask_index(&mut self, label: &str) -> Result<usize> {
        let answer = self.ask(label)?;
        answer
            .trim()
            .parse()
            .with_context(|| format!("'{}' is not a row index", answer.trim()))
    }

    /// Run until the user quits or input ends.
    pub async fn run(&mut self) -> Result<()> {
        self.navigator
            .initialize()
            .await
            .context("Failed to open the shared folder")?;
        let folder = self.navigator.folder_name().to_string();
        self.say(format!("Ready to work in {}", folder))?;

        loop {
            if let Err(e) = self.show_folder().await {
                self.say(format!("Error listing folder: {:#}", e))?;
            }
            self.show_menu()?;

            let option = self.ask("\nChoose an option: ")?;
            if self.closed {
                break;
            }
            let result = match option.trim() {
                "1" => self.open_item().await,
                "2" => self.go_back(),
                "3" => self.create_spreadsheet().await,
                "4" => self.read_spreadsheet().await,
                "5" => self.edit_spreadsheet().await,
                "6" => self.delete_item().await,
                "7" => self.create_folder().await,
                "8" => self.say("Refreshing..."),
                "9" => break,
                other => self.say(format!("Unknown option '{}'", other)),
            };
            if let Err(e) = result {
                self.say(format!("Error: {:#}", e))?;
            }
            if self.closed {
                break;
            }
        }

        self.say("Goodbye!")
    }

    async fn show_folder(&mut self) -> Result<()> {
        let breadcrumb = self.navigator.cursor()?.breadcrumb();
        self.say(format!("\n{}", "=".repeat(RULE_WIDTH)))?;
        self.say(format!("Location: {}", breadcrumb))?;
        self.say("=".repeat(RULE_WIDTH))?;

        let listing = self.navigator.list_current().await?;
        let (folders, files): (Vec<DriveItem>, Vec<DriveItem>) =
            listing.into_iter().partition(DriveItem::is_folder);
        self.items = folders.iter().chain(&files).cloned().collect();

        if self.items.is_empty() {
            return self.say("This folder is empty");
        }

        self.say(format!("\nContents ({} items):", self.items.len()))?;
        self.say("-".repeat(RULE_WIDTH))?;
        if !folders.is_empty() {
            self.say("Folders:")?;
            for (i, folder) in folders.iter().enumerate() {
                self.say(format!("  {}. {}/", i + 1, folder.name))?;
            }
        }
        if !files.is_empty() {
            self.say("Files:")?;
            for (i, file) in files.iter().enumerate() {
                self.say(format!(
                    "  {}. {} ({:.2} MB)",
                    folders.len() + i + 1,
                    file.name,
                    file.size_mb()
                ))?;
            }
        }
        Ok(())
    }

    fn show_menu(&mut self) -> Result<()> {
        self.say("\nOptions:")?;
        self.say("1. Open item (by number)")?;
        self.say("2. Go back")?;
        self.say("3. Create spreadsheet")?;
        self.say("4. Read spreadsheet")?;
        self.say("5. Edit spreadsheet")?;
        self.say("6. Delete item")?;
        self.say("7. Create folder")?;
        self.say("8. Refresh")?;
        self.say("9. Quit")
    }

    async fn open_item(&mut self) -> Result<()> {
        if self.items.is_empty() {
            return self.say("Nothing to open here");
        }
        let index = self.ask_choice("Item number: ", self.items.len())?;
        let item = self.items[index].clone();
        if item.is_folder() {
            self.navigator.enter(&item)?;
            self.say(format!("Entering {}", item.name))
        } else {
            self.say(format!("{} is a file; use option 4 to read it", item.name))
        }
    }

    fn go_back(&mut self) -> Result<()> {
        if self.navigator.go_back()? {
            self.say("Back to the previous folder")
        } else {
            self.say("Already at the top folder")
        }
    }

    async fn create_spreadsheet(&mut self) -> Result<()> {
        let filename = self.ask("File name (without extension): ")?;
        let filename = filename.trim().to_string();
        if filename.is_empty() {
            bail!("File name cannot be empty");
        }

        let custom = self.ask("Enter your own data? (y/n): ")?;
        let table = if custom.trim().eq_ignore_ascii_case("y") {
            Some(self.ask_table()?)
        } else {
            None
        };

        let created = self
            .navigator
            .create_file(&filename, table.as_ref(), None)
            .await?;
        self.say(format!("Created {} ({})", created.name, created.id))
    }

    fn ask_table(&mut self) -> Result<Table> {
        let names = split_list(&self.ask("Column names (comma separated): ")?);
        if names.is_empty() {
            bail!("At least one column is required");
        }

        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let values = split_list(&self.ask(&format!("Values for '{}' (comma separated): ", name))?);
            columns.push(Column::new(name, ColumnData::infer_from_strings(&values)));
        }
        Ok(Table::new(columns)?)
    }

    /// Let the user pick one of the spreadsheets in the current folder.
    fn choose_spreadsheet(&mut self, verb: &str) -> Result<Option<DriveItem>> {
        let sheets: Vec<DriveItem> = self.items.iter().filter(|i| is_spreadsheet(i)).cloned().collect();
        if sheets.is_empty() {
            self.say("No spreadsheets in this folder")?;
            return Ok(None);
        }

        self.say("\nSpreadsheets:")?;
        for (i, sheet) in sheets.iter().enumerate() {
            self.say(format!("  {}. {}", i + 1, sheet.name))?;
        }
        let index = self.ask_choice(&format!("File to {} (number): ", verb), sheets.len())?;
        Ok(Some(sheets[index].clone()))
    }

    async fn read_spreadsheet(&mut self) -> Result<()> {
        let Some(sheet) = self.choose_spreadsheet("read")? else {
            return Ok(());
        };
        let table = self.navigator.read_file(&sheet.id).await?;
        self.say(format!("\nContents of {}:", sheet.name))?;
        self.say("-".repeat(RULE_WIDTH))?;
        let rendered = render_table(&table, PREVIEW_ROWS);
        write!(self.output, "{}", rendered).context("Failed to write output")?;
        Ok(())
    }

    async fn edit_spreadsheet(&mut self) -> Result<()> {
        let Some(sheet) = self.choose_spreadsheet("edit")? else {
            return Ok(());
        };
        let mut table = self.navigator.read_file(&sheet.id).await?;
        self.say(format!("\nCurrent contents of {}:", sheet.name))?;
        let rendered = render_table(&table, table.height());
        write!(self.output, "{}", rendered).context("Failed to write output")?;

        self.say("\nEdit options:")?;
        self.say("1. Add row")?;
        self.say("2. Change a value")?;
        self.say("3. Add column")?;
        self.say("4. Delete row")?;

        match self.ask("Choose an edit: ")?.trim() {
            "1" => {
                let mut values = Vec::with_capacity(table.width());
                for column in table.columns() {
                    let label = format!("Value for '{}' ({}): ", column.name, column.data.kind());
                    let answer = self.ask(&label)?;
                    values.push(column.data.kind().parse(&answer)?);
                }
                table.push_row(values)?;
            }
            "2" => {
                let row = self.ask_index(&format!(
                    "Row index (0-{}): ",
                    table.height().saturating_sub(1)
                ))?;
                let names = table.column_names().join(", ");
                let name = self.ask(&format!("Column [{}]: ", names))?;
                let name = name.trim();
                let column = table
                    .column(name)
                    .with_context(|| format!("Unknown column '{}'", name))?;
                if let Some(current) = column.data.get(row) {
                    self.say(format!("Current value: {}", current))?;
                }
                let kind = column.data.kind();
                let value = kind.parse(&self.ask("New value: ")?)?;
                table.set_cell(row, name, value)?;
            }
            "3" => {
                let name = self.ask("New column name: ")?;
                let default = self.ask("Default value: ")?;
                table.add_column(name.trim(), CellValue::infer(&default))?;
            }
            "4" => {
                let row = self.ask_index(&format!(
                    "Row index to delete (0-{}): ",
                    table.height().saturating_sub(1)
                ))?;
                table.remove_row(row)?;
            }
            other => bail!("Unknown edit option '{}'", other),
        }

        self.navigator.update_file(&sheet.id, &table).await?;
        self.say(format!("{} updated", sheet.name))
    }

    async fn delete_item(&mut self) -> Result<()> {
        if self.items.is_empty() {
            return self.say("Nothing to delete here");
        }

        self.say("\nItems:")?;
        let entries: Vec<String> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("  {}. [{}] {}", i + 1, item.kind, item.name))
            .collect();
        for entry in entries {
            self.say(entry)?;
        }

        let index = self.ask_choice("Item to delete (number): ", self.items.len())?;
        let item = self.items[index].clone();
        let confirm = self.ask(&format!("Really delete '{}'? (y/N): ", item.name))?;
        if !confirm.trim().eq_ignore_ascii_case("y") {
            return self.say("Deletion cancelled");
        }

        self.navigator.delete_item(&item.id).await?;
        self.say(format!("Deleted {}", item.name))
    }

    async fn create_folder(&mut self) -> Result<()> {
        let name = self.ask("New folder name: ")?;
        let name = name.trim().to_string();
        if name.is_empty() {
            bail!("Folder name cannot be empty");
        }
        let folder = self.navigator.create_folder(&name, None).await?;
        self.say(format!("Created folder {}", folder.name))
    }
}
