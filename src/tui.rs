//! Terminal and file output.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;

use crate::merge::Row;

/// Prints a red `[!]` status line to stderr, or the bare message in
/// accessible mode.
#[macro_export]
macro_rules! warning {
    ($name:expr) => {
        eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
    };
    ($name:expr, $accessible:expr) => {
        if $accessible {
            eprintln!("{}", $name);
        } else {
            eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
        }
    };
}

/// Prints a blue `[~]` status line to stderr.
#[macro_export]
macro_rules! detail {
    ($name:expr) => {
        eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
    };
    ($name:expr, $accessible:expr) => {
        if $accessible {
            eprintln!("{}", $name);
        } else {
            eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
        }
    };
}

/// Prints a green `[>]` line to stdout.
#[macro_export]
macro_rules! output {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::green("[>]")), $name);
    };
    ($name:expr, $accessible:expr) => {
        if $accessible {
            println!("{}", $name);
        } else {
            println!("{} {}", colored::Colorize::bold(colored::Colorize::green("[>]")), $name);
        }
    };
}

/// Which optional columns to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Columns {
    pub mac: bool,
    pub vendor: bool,
}

const MISSING: &str = "-";

/// Renders one line per host with port numbers only.
pub fn render_table(rows: &[Row], columns: Columns) -> String {
    let mut header = vec!["IP"];
    if columns.mac {
        header.push("MAC");
    }
    if columns.vendor {
        header.push("VENDOR");
    }
    header.extend(["HOSTNAME", "UP", "PORTS"]);

    let lines: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.ip.clone()];
            if columns.mac {
                cells.push(row.mac.clone().unwrap_or_else(|| MISSING.to_owned()));
            }
            if columns.vendor {
                cells.push(row.vendor.clone().unwrap_or_else(|| MISSING.to_owned()));
            }
            cells.push(row.hostname.clone().unwrap_or_else(|| MISSING.to_owned()));
            cells.push(yes_no(row.up).to_owned());
            cells.push(port_numbers(&row.ports));
            cells
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            lines
                .iter()
                .map(|cells| cells[i].len())
                .chain(std::iter::once(header[i].len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let format_line = |cells: &[&str]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .join("  ")
            .trim_end()
            .to_owned()
    };

    let mut out = format_line(&header);
    out.push('\n');
    for cells in &lines {
        let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
        out.push_str(&format_line(&cells));
        out.push('\n');
    }
    out
}

/// Renders every host with its full port labels underneath.
pub fn render_tree(rows: &[Row], columns: Columns) -> String {
    let mut out = String::new();

    for row in rows {
        out.push_str(&row.ip);
        if let Some(hostname) = &row.hostname {
            out.push_str(&format!(" ({hostname})"));
        }
        let hardware = [
            row.mac.as_deref().filter(|_| columns.mac),
            row.vendor.as_deref().filter(|_| columns.vendor),
        ];
        if hardware.iter().any(Option::is_some) {
            out.push_str(&format!(" [{}]", hardware.iter().flatten().join(" ")));
        }
        out.push('\n');
        out.push_str(&format!("├── up: {}\n", yes_no(row.up)));

        if row.ports.is_empty() {
            out.push_str("└── no open ports\n");
            continue;
        }
        for (i, label) in row.ports.iter().enumerate() {
            let branch = if i + 1 == row.ports.len() { "└──" } else { "├──" };
            out.push_str(&format!("{branch} {label}\n"));
        }
    }
    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// `22/tcp ssh` becomes `22`. Labels are already in merge order.
fn port_numbers(labels: &[String]) -> String {
    if labels.is_empty() {
        return MISSING.to_owned();
    }
    labels
        .iter()
        .filter_map(|label| label.split('/').next())
        .join(",")
}

/// Writes `rows` as a pretty-printed JSON array.
pub fn write_json(rows: &[Row], path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, rows)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::{render_table, render_tree, write_json, Columns};
    use crate::merge::Row;

    fn rows() -> Vec<Row> {
        vec![
            Row {
                ip: "192.168.1.5".to_owned(),
                mac: Some("3C:5A:B4:01:02:03".to_owned()),
                vendor: Some("TP-Link".to_owned()),
                hostname: Some("printer.lan".to_owned()),
                up: true,
                ports: vec!["22/tcp ssh OpenSSH".to_owned(), "9000/tcp".to_owned()],
            },
            Row {
                ip: "192.168.1.9".to_owned(),
                up: false,
                ..Row::default()
            },
        ]
    }

    #[test]
    fn table_shows_port_numbers_only() {
        let table = render_table(&rows(), Columns::default());

        assert_eq!(
            table,
            "IP           HOSTNAME     UP   PORTS\n\
             192.168.1.5  printer.lan  yes  22,9000\n\
             192.168.1.9  -            no   -\n"
        );
    }

    #[test]
    fn table_optional_columns() {
        let table = render_table(
            &rows(),
            Columns {
                mac: true,
                vendor: true,
            },
        );
        let header = table.lines().next().unwrap();

        assert_eq!(header.split_whitespace().collect::<Vec<_>>(), vec![
            "IP", "MAC", "VENDOR", "HOSTNAME", "UP", "PORTS"
        ]);
        assert!(table.contains("3C:5A:B4:01:02:03  TP-Link"));
    }

    #[test]
    fn tree_lists_full_labels() {
        let tree = render_tree(
            &rows(),
            Columns {
                mac: true,
                vendor: false,
            },
        );

        assert_eq!(
            tree,
            "192.168.1.5 (printer.lan) [3C:5A:B4:01:02:03]\n\
             ├── up: yes\n\
             ├── 22/tcp ssh OpenSSH\n\
             └── 9000/tcp\n\
             192.168.1.9\n\
             ├── up: no\n\
             └── no open ports\n"
        );
    }

    #[test]
    fn json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        write_json(&rows(), &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[0]["vendor"], "TP-Link");
        assert_eq!(written[1], serde_json::json!({ "ip": "192.168.1.9", "up": false }));
    }
}
