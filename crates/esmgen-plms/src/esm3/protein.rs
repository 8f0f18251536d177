//! The protein record passed between generation calls, and its PDB output.
use anyhow::{anyhow, bail, Result};
use candle_core::{Device, Tensor};
use itertools::izip;
use pdbtbx::{Atom, Model, StrictnessLevel, PDB};
use std::path::Path;

const CHAIN_ID: &str = "A";
// (atom name, element symbol)
const BACKBONE_ATOMS: [(&str, &str); 4] = [("N", "N"), ("CA", "C"), ("C", "C"), ("O", "O")];

/// A protein moving through the generation workflow. Starts as a bare
/// sequence; structure generation fills in backbone coordinates
/// (`[len, 4, 3]`, N/CA/C/O per residue) and per-residue pLDDT.
#[derive(Debug, Default)]
pub struct ESMProtein {
    sequence: Option<String>,
    coordinates: Option<Tensor>,
    plddt: Option<Tensor>,
}

impl ESMProtein {
    pub fn from_sequence(sequence: impl Into<String>) -> Self {
        Self {
            sequence: Some(sequence.into()),
            ..Default::default()
        }
    }

    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    pub fn coordinates(&self) -> Option<&Tensor> {
        self.coordinates.as_ref()
    }

    pub fn plddt(&self) -> Option<&Tensor> {
        self.plddt.as_ref()
    }

    pub fn with_coordinates(mut self, coordinates: Tensor) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_plddt(mut self, plddt: Tensor) -> Self {
        self.plddt = Some(plddt);
        self
    }

    pub fn len(&self) -> usize {
        if let Some(seq) = &self.sequence {
            seq.chars().count()
        } else if let Some(coords) = &self.coordinates {
            coords.dims().first().copied().unwrap_or(0)
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the predicted structure as PDB text. pLDDT lands in the
    /// B-factor column when present.
    pub fn to_pdb<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let pdb = self.build_pdb()?;
        let path = path
            .as_ref()
            .to_str()
            .ok_or_else(|| anyhow!("output path is not valid UTF-8"))?;
        pdbtbx::save_pdb(&pdb, path, StrictnessLevel::Loose)
            .map_err(|errors| anyhow!("failed to write PDB file: {errors:?}"))
    }

    pub fn to_pdb_string(&self) -> Result<String> {
        let pdb = self.build_pdb()?;
        let mut buffer = Vec::new();
        pdbtbx::save_pdb_raw(
            &pdb,
            std::io::BufWriter::new(&mut buffer),
            StrictnessLevel::Loose,
        );
        Ok(String::from_utf8(buffer)?)
    }

    fn build_pdb(&self) -> Result<PDB> {
        let sequence = self
            .sequence
            .as_ref()
            .ok_or_else(|| anyhow!("sequence required to build a PDB"))?
            .replace('_', "X");
        let coordinates = self
            .coordinates
            .as_ref()
            .ok_or_else(|| anyhow!("coordinates required to build a PDB"))?;

        let coords = coordinates
            .to_device(&Device::Cpu)?
            .to_dtype(candle_core::DType::F32)?
            .to_vec3::<f32>()?;
        if coords.len() != sequence.chars().count() {
            bail!(
                "coordinate/sequence length mismatch: {} vs {}",
                coords.len(),
                sequence.chars().count()
            );
        }
        let plddt = match &self.plddt {
            Some(t) => t.to_device(&Device::Cpu)?.to_vec1::<f32>()?,
            None => vec![1.0; coords.len()],
        };

        let mut model = Model::new(1);
        let mut serial = 1usize;
        for (i, (aa, residue_coords, confidence)) in
            izip!(sequence.chars(), &coords, &plddt).enumerate()
        {
            let res_name = three_letter_code(aa);
            for ((atom_name, element), pos) in BACKBONE_ATOMS.iter().zip(residue_coords) {
                let [x, y, z] = pos.as_slice() else {
                    bail!("expected xyz coordinates, got {} values", pos.len());
                };
                let atom = Atom::new(
                    false,
                    serial,
                    *atom_name,
                    *x as f64,
                    *y as f64,
                    *z as f64,
                    1.0,
                    (confidence * 100.0) as f64,
                    *element,
                    0,
                )
                .ok_or_else(|| anyhow!("invalid atom at residue {}", i + 1))?;
                model.add_atom(atom, CHAIN_ID, (i as isize + 1, None), (res_name, None));
                serial += 1;
            }
        }

        let mut pdb = PDB::new();
        pdb.add_model(model);
        Ok(pdb)
    }
}

fn three_letter_code(aa: char) -> &'static str {
    match aa.to_ascii_uppercase() {
        'A' => "ALA",
        'R' => "ARG",
        'N' => "ASN",
        'D' => "ASP",
        'C' => "CYS",
        'E' => "GLU",
        'Q' => "GLN",
        'G' => "GLY",
        'H' => "HIS",
        'I' => "ILE",
        'L' => "LEU",
        'K' => "LYS",
        'M' => "MET",
        'F' => "PHE",
        'P' => "PRO",
        'S' => "SER",
        'T' => "THR",
        'W' => "TRP",
        'Y' => "TYR",
        'V' => "VAL",
        _ => "UNK",
    }
}
