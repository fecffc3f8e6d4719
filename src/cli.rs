use clap::{Parser, Subcommand};

use crate::billing::Period;

#[derive(Debug, Parser)]
#[command(name = "tesoreria")]
#[command(about = "Bookkeeping and billing service for member organizations")]
pub struct Cli {
    /// Date used as "today" by batch commands (YYYY-MM-DD); defaults to the local date
    #[arg(long, global = true, env = "TESORERIA_TODAY")]
    pub today: Option<chrono::NaiveDate>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (and the scheduler loop when enabled)
    Serve,
    /// Issue the invoices of a period for every billable organization
    #[command(name = "billing:generate")]
    BillingGenerate {
        /// Billing period (YYYY-MM); defaults to the current month
        #[arg(long, value_parser = parse_period)]
        period: Option<Period>,
    },
    /// Expire overdue invoices and disable their organizations
    #[command(name = "billing:expire")]
    BillingExpire,
    /// Remind organizations of invoices about to fall due
    #[command(name = "billing:remind")]
    BillingRemind,
    /// Disable organizations whose paid period or trial ended
    #[command(name = "organizations:disable-expired")]
    OrganizationsDisableExpired,
    /// Warn organizations whose trial ends soon
    #[command(name = "trials:remind")]
    TrialsRemind,
    /// Run every batch job once
    #[command(name = "schedule:run")]
    ScheduleRun,
}

fn parse_period(value: &str) -> Result<Period, String> {
    value.parse::<Period>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_with_period() {
        let cli = Cli::try_parse_from(["tesoreria", "billing:generate", "--period", "2024-05"]).unwrap();
        match cli.command {
            Some(Command::BillingGenerate { period: Some(period) }) => assert_eq!(period.to_string(), "2024-05"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_period() {
        assert!(Cli::try_parse_from(["tesoreria", "billing:generate", "--period", "2024-5"]).is_err());
    }

    #[test]
    fn colon_named_subcommands() {
        let cases = [
            ("billing:expire", "BillingExpire"),
            ("billing:remind", "BillingRemind"),
            ("organizations:disable-expired", "OrganizationsDisableExpired"),
            ("trials:remind", "TrialsRemind"),
            ("schedule:run", "ScheduleRun"),
        ];
        for (name, variant) in cases {
            let cli = Cli::try_parse_from(["tesoreria", name]).unwrap();
            assert_eq!(format!("{:?}", cli.command.unwrap()), variant);
        }
        assert!(Cli::try_parse_from(["tesoreria", "billing", "generate"]).is_err());

        let cli = Cli::try_parse_from(["tesoreria", "--today", "2024-05-11", "schedule:run"]).unwrap();
        assert_eq!(cli.today.map(|d| d.to_string()).as_deref(), Some("2024-05-11"));
        assert!(matches!(Cli::try_parse_from(["tesoreria"]).unwrap().command, None));
    }
}
