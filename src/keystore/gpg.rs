//! gpg-backed key store
//!
//! Spawns the gpg binary with batch-mode flags and maps its stderr onto the
//! key-store error taxonomy. The passphrase is handed over through a
//! mode-0600 temporary file (`--passphrase-file`), never on the command line.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;

use super::{KeyStore, KeyStoreError, KeyStoreResult};

/// Key store spawning the gpg binary
pub struct GpgKeyStore {
    binary: PathBuf,
    homedir: Option<PathBuf>,
}

impl GpgKeyStore {
    pub fn new(binary: PathBuf, homedir: Option<PathBuf>) -> Self {
        Self { binary, homedir }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--batch").arg("--no-tty").arg("--quiet");
        if let Some(home) = &self.homedir {
            cmd.arg("--homedir").arg(home);
        }
        cmd
    }

    /// Run gpg with `input` on stdin, collecting stdout and stderr
    fn run(&self, mut cmd: Command, input: Vec<u8>) -> KeyStoreResult<std::process::Output> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| KeyStoreError::Backend("child stdin unavailable".to_string()))?;
        // Writer thread avoids a pipe deadlock on large artifacts
        let writer = std::thread::spawn(move || {
            let _ = stdin.write_all(&input);
        });
        let output = child.wait_with_output()?;
        let _ = writer.join();
        Ok(output)
    }
}

impl KeyStore for GpgKeyStore {
    fn resolve(&self, key_id: &str) -> KeyStoreResult<()> {
        let mut cmd = self.base_command();
        cmd.arg("--list-keys").arg(key_id);
        let output = self.run(cmd, Vec::new())?;
        if output.status.success() {
            Ok(())
        } else {
            Err(KeyStoreError::KeyNotFound(key_id.to_string()))
        }
    }

    fn sign(&self, data: &[u8], key_id: &str, passphrase: &str) -> KeyStoreResult<Vec<u8>> {
        let mut passphrase_file = NamedTempFile::new()?;
        passphrase_file.write_all(passphrase.as_bytes())?;
        passphrase_file.flush()?;

        let mut cmd = self.base_command();
        cmd.arg("--pinentry-mode")
            .arg("loopback")
            .arg("--passphrase-file")
            .arg(passphrase_file.path())
            .arg("--local-user")
            .arg(key_id)
            .arg("--detach-sign")
            .arg("--output")
            .arg("-");

        let output = self.run(cmd, data.to_vec())?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(classify_stderr(&output.stderr, key_id))
        }
    }

    fn verify(&self, data: &[u8], signature: &[u8], _key_id: &str) -> KeyStoreResult<bool> {
        let mut sig_file = NamedTempFile::new()?;
        sig_file.write_all(signature)?;
        sig_file.flush()?;
        let mut data_file = NamedTempFile::new()?;
        data_file.write_all(data)?;
        data_file.flush()?;

        let mut cmd = self.base_command();
        cmd.arg("--verify").arg(sig_file.path()).arg(data_file.path());

        let output = self.run(cmd, Vec::new())?;
        Ok(output.status.success())
    }

    fn encrypt(&self, data: &[u8], recipients: &[String]) -> KeyStoreResult<Vec<u8>> {
        if recipients.is_empty() {
            return Err(KeyStoreError::NoRecipients);
        }

        let mut cmd = self.base_command();
        cmd.arg("--trust-model").arg("always").arg("--encrypt");
        for recipient in recipients {
            cmd.arg("--recipient").arg(recipient);
        }
        cmd.arg("--output").arg("-");

        let output = self.run(cmd, data.to_vec())?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(classify_stderr(&output.stderr, &recipients.join(",")))
        }
    }
}

/// Map gpg stderr onto the key-store taxonomy
fn classify_stderr(stderr: &[u8], key_hint: &str) -> KeyStoreError {
    let text = String::from_utf8_lossy(stderr);
    if text.contains("No secret key") || text.contains("No public key") {
        KeyStoreError::KeyNotFound(key_hint.to_string())
    } else if text.contains("Bad passphrase") || text.contains("bad passphrase") {
        KeyStoreError::PassphraseInvalid(key_hint.to_string())
    } else {
        KeyStoreError::Backend(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_stderr() {
        assert!(matches!(
            classify_stderr(b"gpg: signing failed: No secret key\n", "k"),
            KeyStoreError::KeyNotFound(_)
        ));
        assert!(matches!(
            classify_stderr(b"gpg: 0xAB: skipped: No public key\n", "k"),
            KeyStoreError::KeyNotFound(_)
        ));
        assert!(matches!(
            classify_stderr(b"gpg: Bad passphrase\n", "k"),
            KeyStoreError::PassphraseInvalid(_)
        ));
        assert!(matches!(
            classify_stderr(b"gpg: disk full\n", "k"),
            KeyStoreError::Backend(_)
        ));
    }

    #[test]
    fn test_encrypt_requires_recipients() {
        let store = GpgKeyStore::new(PathBuf::from("gpg"), None);
        assert!(matches!(
            store.encrypt(b"data", &[]),
            Err(KeyStoreError::NoRecipients)
        ));
    }
}
