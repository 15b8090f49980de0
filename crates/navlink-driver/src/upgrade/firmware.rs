//! Firmware image sections.
//!
//! Combined OpenRTK images concatenate tagged sections:
//!
//! ```text
//! rtk_start:<len:4 LE><len bytes> imu_start:<len:4 LE><len bytes> sdk_start:...
//! ```
//!
//! Any other file is a single application image.

use crate::error::UpgradeError;

const SECTION_LENGTH_SIZE: usize = 4;

/// Which core a section targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Rtk,
    Imu,
    Sdk,
    /// The whole file of an untagged image.
    Whole,
}

impl SectionKind {
    const TAGGED: [SectionKind; 3] = [SectionKind::Rtk, SectionKind::Imu, SectionKind::Sdk];

    pub const fn marker(&self) -> &'static [u8] {
        match self {
            SectionKind::Rtk => b"rtk_start:",
            SectionKind::Imu => b"imu_start:",
            SectionKind::Sdk => b"sdk_start:",
            SectionKind::Whole => b"",
        }
    }
}

/// A firmware file split into its sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    sections: Vec<(SectionKind, Vec<u8>)>,
}

impl FirmwareImage {
    pub fn parse(bytes: &[u8]) -> Result<Self, UpgradeError> {
        if bytes.is_empty() {
            return Err(UpgradeError::Image("empty file".into()));
        }
        if !SectionKind::TAGGED
            .iter()
            .any(|k| bytes.starts_with(k.marker()))
        {
            return Ok(FirmwareImage {
                sections: vec![(SectionKind::Whole, bytes.to_vec())],
            });
        }

        let mut sections = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let kind = SectionKind::TAGGED
                .into_iter()
                .find(|k| rest.starts_with(k.marker()))
                .ok_or_else(|| {
                    UpgradeError::Image(format!(
                        "unknown section at offset {}",
                        bytes.len() - rest.len()
                    ))
                })?;
            rest = &rest[kind.marker().len()..];
            let len_bytes: [u8; SECTION_LENGTH_SIZE] = rest
                .get(..SECTION_LENGTH_SIZE)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| UpgradeError::Image(format!("{kind:?} section has no length")))?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            rest = &rest[SECTION_LENGTH_SIZE..];
            let content = rest.get(..len).ok_or_else(|| {
                UpgradeError::Image(format!(
                    "{kind:?} section declares {len} bytes, {} remain",
                    rest.len()
                ))
            })?;
            if sections.iter().any(|(k, _)| *k == kind) {
                return Err(UpgradeError::Image(format!("duplicate {kind:?} section")));
            }
            sections.push((kind, content.to_vec()));
            rest = &rest[len..];
        }
        Ok(FirmwareImage { sections })
    }

    /// Whether the file carried section tags.
    pub fn is_combined(&self) -> bool {
        !matches!(self.sections.as_slice(), [(SectionKind::Whole, _)])
    }

    pub fn section(&self, kind: SectionKind) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, data)| data.as_slice())
    }

    pub fn sections(&self) -> impl Iterator<Item = (SectionKind, &[u8])> {
        self.sections.iter().map(|(k, d)| (*k, d.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.sections.iter().map(|(_, d)| d.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(kind: SectionKind, data: &[u8]) -> Vec<u8> {
        let mut out = kind.marker().to_vec();
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_plain_image_is_one_section() {
        let image = FirmwareImage::parse(&[0xAB; 300]).unwrap();
        assert!(!image.is_combined());
        assert_eq!(image.section(SectionKind::Whole).map(<[u8]>::len), Some(300));
        assert!(FirmwareImage::parse(&[]).is_err());
    }

    #[test]
    fn test_combined_image() {
        let mut bytes = section(SectionKind::Rtk, &[1; 10]);
        bytes.extend(section(SectionKind::Imu, &[2; 20]));
        bytes.extend(section(SectionKind::Sdk, &[3; 5]));
        let image = FirmwareImage::parse(&bytes).unwrap();
        assert!(image.is_combined());
        assert_eq!(image.section(SectionKind::Rtk), Some(&[1u8; 10][..]));
        assert_eq!(image.section(SectionKind::Imu), Some(&[2u8; 20][..]));
        assert_eq!(image.len(), 35);
        let kinds: Vec<SectionKind> = image.sections().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![SectionKind::Rtk, SectionKind::Imu, SectionKind::Sdk]);
    }

    #[test]
    fn test_truncated_section_is_rejected() {
        let mut bytes = section(SectionKind::Imu, &[2; 20]);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(FirmwareImage::parse(&bytes), Err(UpgradeError::Image(_))));

        let mut trailing = section(SectionKind::Rtk, &[1; 4]);
        trailing.extend_from_slice(b"junk");
        assert!(FirmwareImage::parse(&trailing).is_err());
    }
}
