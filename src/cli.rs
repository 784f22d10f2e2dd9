use clap::{Parser, Subcommand};
use std::path::PathBuf;

use supertree::{Partitioner, Weighting};

/// Build supertrees from overlapping phylogenetic trees, and decompose
/// large guide trees into overlapping subproblems
#[derive(Parser, Debug)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a supertree from a set of overlapping input trees
    Build {
        /// Input file with one newick tree per line
        trees: PathBuf,

        /// Optional file with one weight per input tree
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Weighting of the proper cluster graph edges
        #[arg(long, value_enum, default_value = "one")]
        weighting: Weighting,

        /// Strategy used to split a connected proper cluster graph
        #[arg(short, long, value_enum, default_value = "min-cut")]
        partitioner: Partitioner,

        /// Do not contract never-separated taxon pairs before partitioning
        #[arg(long)]
        no_contract: bool,

        /// Output newick file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decompose a guide tree into overlapping subproblems
    Decompose {
        /// Input newick file of the guide tree
        guide: PathBuf,

        /// Maximum number of tips per subproblem
        #[arg(short, long)]
        max_size: usize,

        /// Output file, one subproblem newick per line
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate a random tree
    Generate {
        /// Number of tips in the generated tree
        #[arg(short, long, default_value_t = 20)]
        tips: usize,

        /// Generate uniform branch lengths
        #[arg(short, long)]
        branch_lengths: bool,

        /// Output newick file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }
}
