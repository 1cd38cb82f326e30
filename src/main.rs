/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use anyhow::{anyhow, Result};
use console::style;
use onemodel_persist::config::PersistConfig;
use onemodel_persist::context::{BeginOptions, Context};
use onemodel_persist::query::{InstanceQuery, QueryBuilder};
use onemodel_persist::util::Util;
use onemodel_persist::Persistence;
use std::env;
use std::path::PathBuf;

const USAGE: &str = "usage: om-inspect [--config <file>] <TypeName>...";

/// Shows what the metadata says about some types, and the SQL a plain query over each of them
/// compiles to.
fn main() -> Result<()> {
    Util::initialize_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let (config_file, type_names) = parse_args(&args)?;
    let config = PersistConfig::load(config_file.as_deref())?;
    let persistence = Persistence::connect(config)?;
    let ctx = persistence.begin(BeginOptions::new())?;
    let mut failures = 0;
    for name in &type_names {
        if let Err(e) = print_type(&ctx, name) {
            failures += 1;
            eprintln!("{} {}: {}", style("error").red().bold(), name, e);
        }
    }
    ctx.close()?;
    if failures > 0 {
        return Err(anyhow!("{} of {} type(s) could not be shown", failures, type_names.len()));
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<(Option<PathBuf>, Vec<String>)> {
    let mut config_file = None;
    let mut type_names = vec![];
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let file = iter.next().ok_or_else(|| anyhow!("--config needs a file\n{}", USAGE))?;
            config_file = Some(PathBuf::from(file));
        } else if arg.starts_with('-') {
            return Err(anyhow!("unknown option {}\n{}", arg, USAGE));
        } else {
            type_names.push(arg.clone());
        }
    }
    if type_names.is_empty() {
        return Err(anyhow!(USAGE));
    }
    Ok((config_file, type_names))
}

fn print_type(ctx: &Context, name: &str) -> Result<()> {
    let t = ctx.get_persistence().get_metadata().get_type(ctx, name)?;
    println!("{} (id {}, uuid {})", style(t.get_name()).bold(), t.get_id(), t.get_uuid());
    if let Some(parent) = t.get_parent_type_id() {
        println!("  parent type: {}", parent);
    }
    match t.get_main_table() {
        Some(table) => println!("  main table: {}", table.get_sql_table()),
        None => println!("  main table: {}", style("none").yellow()),
    }
    if t.is_abstract() {
        println!("  {}", style("abstract").dim());
    }
    for a in t.get_attributes().values() {
        println!(
            "  {:<24} {:<16} {}{}",
            a.get_name(),
            format!("{:?}", a.get_kind()),
            a.get_sql_columns().join(","),
            if a.is_required() { " (required)" } else { "" }
        );
    }
    let sql = InstanceQuery::new(QueryBuilder::new(name).build()).get_sql(ctx)?;
    println!("  {}", style(sql).cyan());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let (file, names) = parse_args(&strings(&["--config", "om.toml", "Invoice", "Person"])).unwrap();
        assert_eq!(file, Some(PathBuf::from("om.toml")));
        assert_eq!(names, vec!["Invoice".to_string(), "Person".to_string()]);
        assert!(parse_args(&strings(&[])).is_err());
        assert!(parse_args(&strings(&["--config"])).is_err());
        assert!(parse_args(&strings(&["-v", "Invoice"])).is_err());
    }
}
