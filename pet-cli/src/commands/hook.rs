//! `pet hook` — CGI-style webhook intake: parse a push notification from
//! stdin and relay it to every configured backend.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use pet_core::types::RefFilter;
use pet_core::EXIT_OK;
use pet_dispatch::{dispatch, HookFormat};

use crate::commands::{load_settings, runtime};
use crate::report;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Github,
    Bitbucket,
}

impl From<FormatArg> for HookFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Github => HookFormat::GitHub,
            FormatArg::Bitbucket => HookFormat::Bitbucket,
        }
    }
}

/// Arguments for `pet hook`.
#[derive(Args, Debug)]
pub struct HookArgs {
    /// Payload format; autodetected from the user agent when omitted.
    #[arg(long, short = 'f', value_enum)]
    pub format: Option<FormatArg>,

    /// Environment variable carrying the sender's user agent (CGI).
    #[arg(long, value_name = "VARIABLE", default_value = "HTTP_USER_AGENT")]
    pub user_agent_env: String,

    /// Emit a CGI response header before the report.
    #[arg(long)]
    pub cgi: bool,
}

impl HookArgs {
    pub fn run(self, config: Option<&Path>) -> Result<i32> {
        let format: HookFormat = match self.format {
            Some(f) => f.into(),
            None => {
                let user_agent = std::env::var(&self.user_agent_env).with_context(|| {
                    format!("user agent variable '{}' is not set", self.user_agent_env)
                })?;
                HookFormat::detect(&user_agent)?
            }
        };

        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("failed to read payload from stdin")?;
        let request = format.parse(&payload)?;

        if self.cgi {
            println!("Content-Type: text/plain");
            println!();
        }

        if matches!(&request.refs, RefFilter::Only(refs) if refs.is_empty()) {
            println!("No syncable branches in payload.");
            return Ok(EXIT_OK);
        }

        let settings = load_settings(config)?;
        let aggregate = runtime()?.block_on(dispatch(&settings, &request))?;
        report::print(&aggregate, false)?;
        Ok(aggregate.exit_code())
    }
}
