//! Command-line argument parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};

pub const USAGE: &str = "\
Usage: placecache <command>

Commands:
  stats                              Show cache counts, age and staleness
  sync provinces                     Fetch the province list
  sync districts                     Fetch districts for every cached province
  sync missing                       Fetch districts for provinces that have none
  sync wards <district_code>         Fetch wards for one district
  sync province-wards <province>     Fetch wards for every district of a province
  sync missing-wards <province>      Fetch wards for districts of a province that have none
  sync all                           Provinces, then their districts, then their wards
  provinces                          List cached provinces
  districts <province_code>          List cached districts of a province
  wards <district_code>              List cached wards of a district
  export [path]                      Write the snapshot document (stdout when no path)
  import <path>                      Replace the cache from a snapshot document
  clear                              Erase the cache";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    Provinces,
    Districts,
    MissingDistricts,
    Wards(i64),
    ProvinceWards(i64),
    MissingWards(i64),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stats,
    Sync(SyncTarget),
    Provinces,
    Districts(i64),
    Wards(i64),
    Export(Option<PathBuf>),
    Import(PathBuf),
    Clear,
    Help,
}

impl Command {
    /// Parse the arguments after the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut args = args.iter().map(String::as_str);
        let command = match args.next() {
            None | Some("help") | Some("--help") | Some("-h") => Command::Help,
            Some("stats") => Command::Stats,
            Some("provinces") => Command::Provinces,
            Some("districts") => Command::Districts(code(args.next(), "province code")?),
            Some("wards") => Command::Wards(code(args.next(), "district code")?),
            Some("export") => Command::Export(args.next().map(PathBuf::from)),
            Some("import") => Command::Import(
                args.next()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("import needs a file path"))?,
            ),
            Some("clear") => Command::Clear,
            Some("sync") => Command::Sync(match args.next() {
                Some("provinces") => SyncTarget::Provinces,
                Some("districts") => SyncTarget::Districts,
                Some("missing") => SyncTarget::MissingDistricts,
                Some("wards") => SyncTarget::Wards(code(args.next(), "district code")?),
                Some("province-wards") => SyncTarget::ProvinceWards(code(args.next(), "province code")?),
                Some("missing-wards") => SyncTarget::MissingWards(code(args.next(), "province code")?),
                Some("all") | None => SyncTarget::All,
                Some(other) => bail!("Unknown sync target '{}'", other),
            }),
            Some(other) => bail!("Unknown command '{}'\n\n{}", other, USAGE),
        };

        if let Some(extra) = args.next() {
            bail!("Unexpected argument '{}'", extra);
        }
        Ok(command)
    }
}

fn code(arg: Option<&str>, what: &str) -> Result<i64> {
    let arg = arg.ok_or_else(|| anyhow!("Missing {}", what))?;
    arg.parse()
        .map_err(|_| anyhow!("Invalid {} '{}'", what, arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command> {
        let args: Vec<String> = line.split_whitespace().map(String::from).collect();
        Command::parse(&args)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("").unwrap(), Command::Help);
        assert_eq!(parse("stats").unwrap(), Command::Stats);
        assert_eq!(parse("districts 79").unwrap(), Command::Districts(79));
        assert_eq!(parse("export").unwrap(), Command::Export(None));
        assert_eq!(
            parse("import snap.json").unwrap(),
            Command::Import(PathBuf::from("snap.json"))
        );
    }

    #[test]
    fn test_parse_sync_targets() {
        assert_eq!(parse("sync").unwrap(), Command::Sync(SyncTarget::All));
        assert_eq!(parse("sync missing").unwrap(), Command::Sync(SyncTarget::MissingDistricts));
        assert_eq!(parse("sync wards 5").unwrap(), Command::Sync(SyncTarget::Wards(5)));
        assert_eq!(
            parse("sync province-wards 1").unwrap(),
            Command::Sync(SyncTarget::ProvinceWards(1))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("districts").is_err());
        assert!(parse("wards abc").is_err());
        assert!(parse("import").is_err());
        assert!(parse("sync everything").is_err());
        assert!(parse("stats now").is_err());
        assert!(parse("frobnicate").is_err());
    }
}
