use anyhow::Result;

use mqnamed::cli::CliApp;

fn main() -> Result<()> {
    CliApp::run()
}
