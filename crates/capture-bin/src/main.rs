//! picam-capture - configure a PICam camera and acquire ROI frames to disk

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    capture_bin::main_with(capture_bin::Cli::parse())
}
