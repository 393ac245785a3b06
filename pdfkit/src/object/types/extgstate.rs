use super::prelude::*;

/// `ExtGState`
#[derive(Debug, Default, Clone)]
pub struct GraphicsStateParameters {
    pub line_width: Option<f32>,
    pub line_cap: Option<i32>,
    pub line_join: Option<i32>,
    pub miter_limit: Option<f32>,
    pub dash_pattern: Option<(Vec<f32>, f32)>,
    pub rendering_intent: Option<Name>,
    pub flatness: Option<f32>,
    pub font: Option<(Primitive, f32)>,
    pub blend_mode: Option<Primitive>,
    pub smask: Option<Primitive>,
    pub stroke_alpha: Option<f32>,
    pub fill_alpha: Option<f32>,
}

impl Object for GraphicsStateParameters {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let dict = p.resolve(resolve)?.into_dictionary(resolve)?;
        dict.expect("ExtGState", "Type", "ExtGState", false)?;

        let number = |key: &str| -> Result<Option<f32>> {
            match dict.get(key) {
                Some(p) => Ok(Some(p.clone().resolve(resolve)?.as_number()?)),
                None => Ok(None),
            }
        };
        let integer = |key: &str| -> Result<Option<i32>> {
            match dict.get(key) {
                Some(p) => Ok(Some(p.clone().resolve(resolve)?.as_integer()?)),
                None => Ok(None),
            }
        };

        let dash_pattern = match dict.get("D") {
            Some(p) => {
                let arr = p.clone().into_array(resolve)?;
                if arr.len() == 2 {
                    let dashes = arr[0]
                        .clone()
                        .into_array(resolve)?
                        .iter()
                        .map(|p| p.as_number())
                        .collect::<Result<Vec<f32>>>()?;
                    let phase = arr[1].as_number()?;
                    Some((dashes, phase))
                } else {
                    warn!("/D entry of length {}", arr.len());
                    None
                }
            }
            None => None,
        };

        let font = match dict.get("Font") {
            Some(p) => {
                let arr = p.clone().into_array(resolve)?;
                if arr.len() == 2 {
                    Some((arr[0].clone(), arr[1].as_number()?))
                } else {
                    None
                }
            }
            None => None,
        };

        Ok(GraphicsStateParameters {
            line_width: number("LW")?,
            line_cap: integer("LC")?,
            line_join: integer("LJ")?,
            miter_limit: number("ML")?,
            dash_pattern,
            rendering_intent: match dict.get("RI") {
                Some(p) => Some(p.as_name()?.clone()),
                None => None,
            },
            flatness: number("FL")?,
            font,
            blend_mode: dict.get("BM").cloned(),
            smask: dict.get("SMask").cloned(),
            stroke_alpha: number("CA")?,
            fill_alpha: number("ca")?,
        })
    }
}
