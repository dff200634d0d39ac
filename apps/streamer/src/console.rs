// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line commands read from stdin.

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use model_stream_client::HttpCodeIndex;
use model_stream_core::{
    Code, CodeTreeNode, LoadOutcome, MemoryScene, QualifiedId, Result, SessionHandle,
};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `codes A,B,C` (no list = empty selection)
    Codes(Vec<Code>),
    /// `ids model|1,model|2`
    Ids(Vec<QualifiedId>),
    Tree,
    Status,
    Quit,
}

fn list(rest: &str) -> impl Iterator<Item = &str> {
    rest.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match verb {
            "codes" => Ok(Command::Codes(list(rest).map(Code::from).collect())),
            "ids" => list(rest)
                .map(QualifiedId::parse)
                .collect::<Result<Vec<_>>>()
                .map(Command::Ids)
                .map_err(|e| e.to_string()),
            "tree" => Ok(Command::Tree),
            "status" => Ok(Command::Status),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command `{}` (codes, ids, tree, status, quit)", other)),
        }
    }
}

fn print_tree(nodes: &[CodeTreeNode], depth: usize) {
    for node in nodes {
        println!("{}{}", "  ".repeat(depth), node.name);
        print_tree(&node.children, depth + 1);
    }
}

fn report(request: usize, outcome: Result<LoadOutcome>, scene: &MemoryScene) {
    match outcome {
        Ok(outcome) => println!(
            "#{request}: fetched {} revealed {} concealed {} -> {} fragment(s), {} node(s) in scene",
            outcome.diff.to_fetch.len(),
            outcome.diff.to_reveal.len(),
            outcome.diff.to_conceal.len(),
            outcome.handles.len(),
            scene.node_count(),
        ),
        Err(e) => println!("#{request}: failed: {e}"),
    }
}

/// Read commands until `quit` or end of input, then wait for loads still
/// in flight. Dropping the handle on return lets the driver stop.
pub async fn run(handle: SessionHandle, index: HttpCodeIndex, scene: Arc<MemoryScene>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: FuturesUnordered<LocalBoxFuture<'static, (usize, Result<LoadOutcome>)>> =
        FuturesUnordered::new();
    let mut requests = 0;
    let mut reading = true;

    while reading || !pending.is_empty() {
        tokio::select! {
            line = lines.next_line(), if reading => {
                let Some(line) = line? else {
                    reading = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };

                let reply = match command {
                    Command::Codes(codes) => handle.send_codes(codes).await?,
                    Command::Ids(ids) => handle.send_ids(ids).await?,
                    Command::Tree => {
                        match index.model_tree().await {
                            Ok(tree) => print_tree(&tree, 0),
                            Err(e) => println!("tree: {e}"),
                        }
                        continue;
                    }
                    Command::Status => {
                        let status = handle.status().await?;
                        println!(
                            "{}: {:?}, selected [{}], loaded {}, in flight {}",
                            status.model_name,
                            status.phase,
                            status.selected.iter().map(Code::as_str).collect::<Vec<_>>().join(","),
                            status.loaded.len(),
                            status.in_flight,
                        );
                        continue;
                    }
                    Command::Quit => {
                        reading = false;
                        continue;
                    }
                };

                requests += 1;
                let request = requests;
                pending.push(async move { (request, SessionHandle::settle(reply).await) }.boxed_local());
            }
            Some((request, outcome)) = pending.next(), if !pending.is_empty() => {
                report(request, outcome, &scene);
            }
        }
    }

    Ok(())
}
