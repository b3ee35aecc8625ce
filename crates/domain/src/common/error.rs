use thiserror::Error;

/// Errors surfaced by the kernel packet-filter seam.
///
/// Command failures carry the full invocation so the operator can re-run
/// it by hand; nothing is retried at this level.
#[derive(Debug, Error)]
pub enum PacketFilterError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {args}: {status}: {stderr}")]
    CommandFailed {
        program: String,
        args: String,
        status: String,
        stderr: String,
    },

    #[error("unable to detect hairpin mode (is the docker daemon running?)")]
    HairpinUndetectable,
}

/// Errors surfaced by the container-runtime seam.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The daemon could not be reached at all (ping, connect).
    #[error("docker daemon unreachable: {0}")]
    Connection(String),

    /// The daemon answered with an error other than "no such object".
    #[error("docker api error: {0}")]
    Api(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_display_includes_invocation() {
        let err = PacketFilterError::CommandFailed {
            program: "ip6tables".to_string(),
            args: "-t nat -C DOCKER -j RETURN".to_string(),
            status: "exit status: 3".to_string(),
            stderr: "ip6tables: No chain/target/match by that name.".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ip6tables"));
        assert!(msg.contains("-t nat"));
        assert!(msg.contains("No chain/target/match"));
    }

    #[test]
    fn hairpin_error_mentions_the_daemon() {
        let msg = PacketFilterError::HairpinUndetectable.to_string();
        assert!(msg.contains("hairpin"));
        assert!(msg.contains("docker daemon"));
    }
}
