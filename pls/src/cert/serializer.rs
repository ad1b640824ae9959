// Certificate binary serializer / deserializer.
//
// Wire format (big-endian):
// [version:1B]
// [subject_len:2B][subject:utf8][subject_pk:32B]
// [enc_flag:1B][encryption_key:32B if flag == 1]
// [issuer_len:2B][issuer:utf8][issuer_pk:32B]
// [valid_from:8B][valid_until:8B]
// [signature:64B]

use crate::cert::Certificate;
use crate::error::{PlsError, Result};

/// Longest accepted subject or issuer name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Serialize a [`Certificate`] into its compact binary form.
pub fn serialize(cert: &Certificate) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    write_signable(cert, &mut buf);
    // Signature (last field)
    buf.extend_from_slice(&cert.signature);
    buf
}

/// Write every field except the signature.
pub(crate) fn write_signable(cert: &Certificate, buf: &mut Vec<u8>) {
    buf.push(Certificate::VERSION);
    write_name(&cert.subject, buf);
    buf.extend_from_slice(&cert.subject_public_key);

    match &cert.encryption_key {
        Some(key) => {
            buf.push(1);
            buf.extend_from_slice(key);
        }
        None => {
            buf.push(0);
        }
    }

    write_name(&cert.issuer, buf);
    buf.extend_from_slice(&cert.issuer_public_key);

    // Validity
    buf.extend_from_slice(&cert.valid_from.to_be_bytes());
    buf.extend_from_slice(&cert.valid_until.to_be_bytes());
}

fn write_name(name: &str, buf: &mut Vec<u8>) {
    // Names are bounded by the builder, so the length always fits.
    let bytes = name.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Cursor over a certificate blob.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(PlsError::MalformedCertificate("unexpected end of data".into()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(arr))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    fn name(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        if len > MAX_NAME_LEN {
            return Err(PlsError::MalformedCertificate(format!(
                "name length {len} exceeds {MAX_NAME_LEN}"
            )));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| PlsError::MalformedCertificate("name is not valid UTF-8".into()))
    }
}

/// Deserialize a [`Certificate`] from its compact binary form.
pub fn deserialize(data: &[u8]) -> Result<Certificate> {
    let mut r = Reader { data, pos: 0 };

    let version = r.u8()?;
    if version != Certificate::VERSION {
        return Err(PlsError::MalformedCertificate(format!(
            "unsupported version {version}"
        )));
    }

    let subject = r.name()?;
    let subject_public_key = r.array::<32>()?;

    let encryption_key = match r.u8()? {
        0 => None,
        1 => Some(r.array::<32>()?),
        other => {
            return Err(PlsError::MalformedCertificate(format!(
                "invalid encryption key flag {other}"
            )))
        }
    };

    let issuer = r.name()?;
    let issuer_public_key = r.array::<32>()?;
    let valid_from = r.u64()?;
    let valid_until = r.u64()?;
    let signature = r.array::<64>()?;

    if r.pos != data.len() {
        return Err(PlsError::MalformedCertificate(format!(
            "{} trailing bytes",
            data.len() - r.pos
        )));
    }

    Ok(Certificate {
        subject,
        subject_public_key,
        encryption_key,
        issuer,
        issuer_public_key,
        valid_from,
        valid_until,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::builder::CertificateBuilder;
    use crate::crypto::keys::IdentityKeyPair;

    fn sample() -> Certificate {
        let kp = IdentityKeyPair::generate();
        CertificateBuilder::new("root.example", &kp)
            .validity(1000, 2000)
            .build()
            .unwrap()
    }

    #[test]
    fn roundtrip() {
        let cert = sample();
        let bytes = serialize(&cert);
        assert_eq!(deserialize(&bytes).unwrap(), cert);
    }

    #[test]
    fn roundtrip_with_encryption_key() {
        let ca = IdentityKeyPair::generate();
        let leaf = IdentityKeyPair::generate();
        let cert = CertificateBuilder::new("leaf", &leaf)
            .encryption_key([9u8; 32])
            .validity(1, 2)
            .issued_by("ca", &ca)
            .build()
            .unwrap();
        let decoded = deserialize(&serialize(&cert)).unwrap();
        assert_eq!(decoded.encryption_key, Some([9u8; 32]));
        assert_eq!(decoded, cert);
    }

    #[test]
    fn truncated_rejected() {
        let bytes = serialize(&sample());
        for cut in [0, 1, 10, bytes.len() - 1] {
            assert!(deserialize(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = serialize(&sample());
        bytes.push(0);
        assert!(matches!(
            deserialize(&bytes),
            Err(PlsError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn bad_version_rejected() {
        let mut bytes = serialize(&sample());
        bytes[0] = 9;
        assert!(deserialize(&bytes).is_err());
    }
}
