//! Outbound connection to the server

use std::time::Duration;

use tokio::net::TcpStream;

use ct_core::ConnectionError;

/// Connect to `address`, failing with [`ConnectionError::Refused`] if no
/// transport can be established within `timeout`
pub async fn connect(address: &str, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(ConnectionError::Refused(format!("{}: {}", address, e))),
        Err(_) => {
            return Err(ConnectionError::Refused(format!(
                "{}: timed out after {:?}",
                address, timeout
            )))
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY: {}", e);
    }
    tracing::info!("Connected to {}", address);
    Ok(stream)
}
