//! Command-line interface.
//!
//! Argument parsing and collaborator wiring only; the workflows live in
//! [`crate::push`] and [`crate::delete`]. [`run`] is the extracted async
//! entrypoint so integration tests can drive the CLI programmatically.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::cache::{HttpCdnClient, HttpUdCacheClient};
use crate::client::HttpCatalogClient;
use crate::collector::LoggingCollector;
use crate::delete::{DeleteEngine, DeleteRequest};
use crate::error::{CourierError, Result};
use crate::publisher::Publisher;
use crate::push::{push, PushConfig};
use crate::source::source_for_url;
use crate::unit::PublishOptions;

/// Exit code for a fatal push pipeline error.
pub const EXIT_PUSH_FAILED: i32 = 59;
/// Exit code for a rejected delete request.
pub const EXIT_DELETE_REJECTED: i32 = 30;

#[derive(Parser)]
#[clap(
    name = "pulp-courier",
    version,
    about = "Push, delete and publish content through a Pulp catalog with ordered cache flushing"
)]
pub struct Cli {
    /// Base URL of the Pulp catalog service
    #[clap(long, env = "PULP_URL")]
    pub pulp_url: String,

    /// Base URL of the UD cache flush service
    #[clap(long, env = "UDCACHE_URL")]
    pub udcache_url: Option<String>,

    /// CDN purge API endpoint
    #[clap(long, env = "CDN_PURGE_URL")]
    pub cdn_purge_url: Option<String>,

    /// Root under which CDN purge URLs are built (CDN_ROOT_URL env wins)
    #[clap(long)]
    pub cdn_root_url: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push content from one or more sources and publish the touched repos
    Push {
        /// Content source URLs (e.g. staged:/path/to/dir)
        #[clap(long, required = true, num_args = 1..)]
        source: Vec<String>,

        /// Stage content bytes only; change no repos, publish nothing
        #[clap(long)]
        pre_push: bool,

        /// Permit RPMs without an embedded signature
        #[clap(long)]
        allow_unsigned: bool,

        /// Pipeline steps to skip (supported: publish)
        #[clap(long, value_delimiter = ',')]
        skip: Vec<String>,

        /// Publish even if the server thinks nothing has changed
        #[clap(long)]
        force: bool,

        /// Ask the server to delete remote content no longer in the repo
        #[clap(long)]
        clean: bool,
    },
    /// Delete named content or whole advisories from repositories
    Delete {
        /// Target repository ids
        #[clap(long = "repo", required = true, value_delimiter = ',')]
        repos: Vec<String>,

        /// RPM filenames, file paths or module coordinates to delete
        #[clap(long = "file", value_delimiter = ',')]
        files: Vec<String>,

        /// Advisory ids whose content should be deleted
        #[clap(long = "advisory")]
        advisories: Vec<String>,

        /// Only delete RPMs signed with one of these keys
        #[clap(long = "signing-key", value_delimiter = ',')]
        signing_keys: Vec<String>,

        /// Permit RPM deletion without a signing-key filter
        #[clap(long)]
        allow_unsigned: bool,

        /// Publish even if the server thinks nothing has changed
        #[clap(long)]
        force: bool,

        /// Ask the server to delete remote content no longer in the repo
        #[clap(long)]
        clean: bool,
    },
}

/// Map a terminal error to the process exit code.
pub fn exit_code(error: &CourierError) -> i32 {
    match error {
        CourierError::Pipeline(_) => EXIT_PUSH_FAILED,
        CourierError::Config(_) | CourierError::Invalid(_) | CourierError::NotFound { .. } => {
            EXIT_DELETE_REJECTED
        }
        _ => 1,
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let client = Arc::new(HttpCatalogClient::new(&cli.pulp_url)?);
    let cdn = match &cli.cdn_purge_url {
        Some(url) => Some(Arc::new(HttpCdnClient::new(url)?) as Arc<dyn crate::cache::CdnClient>),
        None => None,
    };
    let ud = match &cli.udcache_url {
        Some(url) => {
            Some(Arc::new(HttpUdCacheClient::new(url)?) as Arc<dyn crate::cache::UdCacheClient>)
        }
        None => None,
    };
    let publisher = Arc::new(Publisher::new(
        client.clone(),
        cdn,
        ud,
        cli.cdn_root_url.clone(),
    ));
    let collector = Arc::new(LoggingCollector);

    match cli.command {
        Commands::Push {
            source,
            pre_push,
            allow_unsigned,
            skip,
            force,
            clean,
        } => {
            for step in &skip {
                if step != "publish" {
                    return Err(CourierError::Config(format!("unknown skip step: {step}")));
                }
            }
            let config = PushConfig {
                allow_unsigned,
                pre_push,
                skip_publish: skip.iter().any(|s| s == "publish"),
                publish: PublishOptions { force, clean },
            };
            for url in source {
                let push_source: Arc<dyn crate::source::PushSource> =
                    Arc::from(source_for_url(&url)?);
                push(
                    push_source,
                    client.clone(),
                    publisher.clone(),
                    collector.clone(),
                    config.clone(),
                )
                .await?;
            }
            Ok(())
        }
        Commands::Delete {
            repos,
            files,
            advisories,
            signing_keys,
            allow_unsigned,
            force,
            clean,
        } => {
            let engine = DeleteEngine::new(client, publisher, collector);
            engine
                .delete(DeleteRequest {
                    repo_ids: repos,
                    names: files,
                    advisory_ids: advisories,
                    signing_keys,
                    allow_unsigned,
                    publish: PublishOptions { force, clean },
                })
                .await
        }
    }
}
