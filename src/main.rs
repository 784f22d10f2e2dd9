use clap::Parser;
use supertree::tree::Tree;
use supertree::{build_supertree, decompose, generate_tree, SupertreeConfig};

mod cli;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli::Args::parse().command {
        cli::Commands::Build {
            trees,
            weights,
            weighting,
            partitioner,
            no_contract,
            output,
        } => {
            let input = std::fs::read_to_string(&trees).unwrap();
            let trees: Vec<Tree> = input
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| Tree::from_newick(line).unwrap())
                .collect();

            let weights: Option<Vec<f64>> = weights.map(|path| {
                std::fs::read_to_string(&path)
                    .unwrap()
                    .split_whitespace()
                    .map(|weight| weight.parse().unwrap())
                    .collect()
            });

            let config = SupertreeConfig {
                weighting,
                contract_edges: !no_contract,
                partitioner,
            };

            let supertree = build_supertree(&trees, weights.as_deref(), config).unwrap();
            supertree.to_file(&output).unwrap()
        }
        cli::Commands::Decompose {
            guide,
            max_size,
            output,
        } => {
            let guide = Tree::from_file(&guide).unwrap();
            let subproblems = decompose(&guide, max_size).unwrap();

            let newicks: Vec<String> = subproblems
                .iter()
                .map(|tree| tree.to_newick().unwrap())
                .collect();
            std::fs::write(&output, newicks.join("\n") + "\n").unwrap()
        }
        cli::Commands::Generate {
            tips,
            branch_lengths,
            output,
        } => {
            let random = generate_tree(tips, branch_lengths).unwrap();
            random.to_file(&output).unwrap()
        }
    }
}
