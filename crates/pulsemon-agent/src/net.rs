//! Outbound interface discovery.

use std::net::UdpSocket;

/// Determines the host's preferred outbound address for reaching `server`
/// by connecting a UDP socket and reading its local endpoint. No packets are
/// sent. Returns an empty string if the interface cannot be determined.
pub fn host_ip_for(server: &str) -> String {
    let probe = || -> std::io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(server)?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    match probe() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!(server, error = %e, "failed to determine host ip");
            String::new()
        }
    }
}
