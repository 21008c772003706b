use crate::args::RemoteArgs;
use anyhow::bail;
use console::style;
use picoclaw_manager::client::{ManagerClient, RemoteAction};
use picoclaw_manager::error::ClientError;

pub(crate) async fn cmd_remote(action: RemoteAction, args: RemoteArgs) -> anyhow::Result<()> {
    let client = ManagerClient::local(args.port, args.token)?;

    let response = match client.send(action).await {
        Ok(response) => response,
        Err(e) => {
            if matches!(e, ClientError::Unreachable { .. }) {
                eprintln!(
                    "{}",
                    style("Is the manager running? Check `systemctl status picoclaw-manager` or run `piman server`.")
                        .dim()
                );
            }
            return Err(e.into());
        }
    };

    if action == RemoteAction::Logs {
        for line in response.recent_logs() {
            println!("{}", line);
        }
    } else {
        println!("{}", response.pretty());
    }

    if !response.status.is_success() {
        bail!("Manager responded with HTTP {}", response.status);
    }
    Ok(())
}

pub(crate) fn cmd_version() {
    println!("PicoClaw Manager (piman) v{}", env!("CARGO_PKG_VERSION"));
}
