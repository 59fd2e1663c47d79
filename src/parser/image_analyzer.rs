use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info, warn};
use std::collections::HashSet;
use std::io::{Cursor, Read as IoRead};

use crate::utils::{PackError, PackResult};

/// Form XObject 嵌套深度上限
const MAX_FORM_DEPTH: u32 = 3;

pub struct ImageAnalyzer;

impl ImageAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// 按页序、页内资源枚举顺序提取嵌入图片。
    /// 返回可直接写入文件的字节：JPEG/JPX 原样返回，像素数据重新编码为 PNG。
    pub fn extract_images(&self, pdf: &[u8]) -> PackResult<Vec<Vec<u8>>> {
        let doc = Document::load_mem(pdf).map_err(|e| PackError::Extraction(format!("PDF加载失败: {}", e)))?;

        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut image_ids: Vec<(ObjectId, u32)> = Vec::new();
        for (page_num, page_id) in doc.get_pages() {
            let page_dict = match doc.get_object(page_id).and_then(Object::as_dict) {
                Ok(d) => d,
                Err(e) => {
                    warn!("第 {} 页无法读取: {}", page_num, e);
                    continue;
                }
            };
            if let Some(xobjects) = self.page_xobjects(&doc, page_dict) {
                self.collect_images(&doc, xobjects, page_num, 0, &mut seen, &mut image_ids);
            }
        }
        info!("PDF中发现 {} 个Image对象", image_ids.len());

        let mut images = Vec::with_capacity(image_ids.len());
        for (obj_id, page_num) in image_ids {
            let stream = match doc.get_object(obj_id).and_then(Object::as_stream) {
                Ok(s) => s,
                Err(e) => {
                    warn!("跳过无法读取的图片 (obj {:?}, 第 {} 页): {}", obj_id, page_num, e);
                    continue;
                }
            };
            match self.encode_image(&doc, stream) {
                Ok(bytes) => images.push(bytes),
                Err(e) => warn!("跳过图片 (obj {:?}, 第 {} 页): {}", obj_id, page_num, e),
            }
        }

        info!("图片提取完成，共 {} 张", images.len());
        Ok(images)
    }

    fn collect_images(
        &self,
        doc: &Document,
        xobjects: &Dictionary,
        page_num: u32,
        depth: u32,
        seen: &mut HashSet<ObjectId>,
        out: &mut Vec<(ObjectId, u32)>,
    ) {
        for (_, val) in xobjects.iter() {
            let ref_id = match val.as_reference() {
                Ok(id) => id,
                Err(_) => continue,
            };
            let stream = match doc.get_object(ref_id).and_then(Object::as_stream) {
                Ok(s) => s,
                Err(_) => continue,
            };
            match name_of(&stream.dict, b"Subtype").as_deref() {
                Some("Image") => {
                    if seen.insert(ref_id) {
                        out.push((ref_id, page_num));
                    }
                }
                Some("Form") if depth < MAX_FORM_DEPTH => {
                    if let Some(nested) = self.get_xobjects_from_dict(doc, &stream.dict) {
                        self.collect_images(doc, nested, page_num, depth + 1, seen, out);
                    }
                }
                _ => {}
            }
        }
    }

    /// 页面自身没有 Resources 时沿 Parent 链向上查找继承的资源
    fn page_xobjects<'a>(&self, doc: &'a Document, page: &'a Dictionary) -> Option<&'a Dictionary> {
        let mut current = page;
        for _ in 0..32 {
            if current.has(b"Resources") {
                return self.get_xobjects_from_dict(doc, current);
            }
            let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
            current = doc.get_object(parent_id).ok()?.as_dict().ok()?;
        }
        None
    }

    /// Extract XObject dictionary from a dict's Resources
    fn get_xobjects_from_dict<'a>(&self, doc: &'a Document, dict: &'a Dictionary) -> Option<&'a Dictionary> {
        let res_ref = dict.get(b"Resources").ok()?;
        let (_, res_obj) = doc.dereference(res_ref).ok()?;
        let res_dict = res_obj.as_dict().ok()?;
        let xobj_ref = res_dict.get(b"XObject").ok()?;
        let (_, xobj_obj) = doc.dereference(xobj_ref).ok()?;
        xobj_obj.as_dict().ok()
    }

    fn encode_image(&self, doc: &Document, stream: &Stream) -> PackResult<Vec<u8>> {
        let filter = self.get_filter_name(&stream.dict);
        debug!("Image filter={:?}", filter);

        match filter.as_deref() {
            Some("DCTDecode") | Some("JPXDecode") => {
                let data = stream.decompressed_content().unwrap_or_else(|_| stream.content.clone());
                if data.is_empty() {
                    return Err(PackError::Extraction("图片数据为空".to_string()));
                }
                Ok(data)
            }
            Some("FlateDecode") => {
                let data = match stream.decompressed_content() {
                    Ok(d) if !d.is_empty() => d,
                    _ => self.manual_inflate(&stream.content)?,
                };
                self.encode_pixels(doc, stream, &data)
            }
            None => self.encode_pixels(doc, stream, &stream.content),
            Some(other) => {
                debug!("{} 无法转码，保存原始数据", other);
                raw_content(stream)
            }
        }
    }

    /// 像素数据转 PNG；位深或色彩空间无法转换时保存原始数据
    fn encode_pixels(&self, doc: &Document, stream: &Stream, data: &[u8]) -> PackResult<Vec<u8>> {
        let dict = &stream.dict;
        let width = dimension(dict, b"Width")?;
        let height = dimension(dict, b"Height")?;
        let bits = int_of(dict, b"BitsPerComponent").unwrap_or(8);
        debug!("Image {}x{}, bpc={}", width, height, bits);

        if let Some(palette) = self.indexed_palette(dict, doc) {
            let rgb = palette.decode(data, width, height, bits)?;
            return to_png(image::RgbImage::from_raw(width, height, rgb).map(image::DynamicImage::ImageRgb8), width, height);
        }

        let channels = self.get_color_channels(dict, doc);
        if bits != 8 || !matches!(channels, 1 | 3 | 4) {
            debug!("位深 {} / 通道 {} 无法转码，保存原始数据", bits, channels);
            return raw_content(stream);
        }

        let expected = sample_len(width, height, channels as usize)?;
        if data.len() < expected {
            return Err(PackError::Extraction(format!(
                "图片数据不匹配: {} < {} ({}x{}, ch={})",
                data.len(), expected, width, height, channels
            )));
        }
        let samples = &data[..expected];

        let img = match channels {
            1 => image::GrayImage::from_raw(width, height, samples.to_vec()).map(image::DynamicImage::ImageLuma8),
            3 => image::RgbImage::from_raw(width, height, samples.to_vec()).map(image::DynamicImage::ImageRgb8),
            _ => image::RgbImage::from_raw(width, height, cmyk_to_rgb(samples)).map(image::DynamicImage::ImageRgb8),
        };
        to_png(img, width, height)
    }

    /// [/Indexed base hival lookup]：lookup 可以是字符串或流
    fn indexed_palette(&self, dict: &Dictionary, doc: &Document) -> Option<Palette> {
        let (_, cs_obj) = doc.dereference(dict.get(b"ColorSpace").ok()?).ok()?;
        let arr = cs_obj.as_array().ok()?;
        if arr.first()?.as_name().ok()? != b"Indexed" {
            return None;
        }

        let hival = usize::try_from(arr.get(2)?.as_i64().ok()?).ok()?;
        let base_channels = match arr.get(1).and_then(|base| base.as_name().ok()) {
            Some(name) => Self::channels_from_name(std::str::from_utf8(name).unwrap_or("DeviceRGB")) as usize,
            None => 3,
        };

        let lookup = match doc.dereference(arr.get(3)?).ok()?.1 {
            Object::String(bytes, _) => bytes.clone(),
            Object::Stream(stream) => stream.decompressed_content().unwrap_or_else(|_| stream.content.clone()),
            _ => return None,
        };
        if lookup.len() < (hival + 1) * base_channels {
            debug!("Indexed lookup表太小: {} < {}", lookup.len(), (hival + 1) * base_channels);
            return None;
        }

        Some(Palette { base_channels, hival, lookup })
    }

    /// 手动使用 flate2 解压数据（lopdf 的 decompressed_content 有时会失败）
    fn manual_inflate(&self, compressed: &[u8]) -> PackResult<Vec<u8>> {
        let mut decoder = flate2::read::ZlibDecoder::new(compressed);
        let mut result = Vec::new();
        if decoder.read_to_end(&mut result).is_ok() && !result.is_empty() {
            return Ok(result);
        }

        let mut decoder = flate2::read::DeflateDecoder::new(compressed);
        result.clear();
        decoder
            .read_to_end(&mut result)
            .map_err(|e| PackError::Extraction(format!("FlateDecode解压失败: {}", e)))?;
        if result.is_empty() {
            return Err(PackError::Extraction("FlateDecode解压结果为空".to_string()));
        }
        Ok(result)
    }

    /// 获取 Filter 名称，处理 Name 和 Array 两种格式
    fn get_filter_name(&self, dict: &Dictionary) -> Option<String> {
        let filter_obj = dict.get(b"Filter").ok()?;

        if let Ok(name_bytes) = filter_obj.as_name() {
            return std::str::from_utf8(name_bytes).ok().map(|s| s.to_string());
        }

        // e.g. [/ASCII85Decode /DCTDecode]：图片编码以最后一个为准
        let arr = filter_obj.as_array().ok()?;
        for item in arr.iter().rev() {
            if let Some(name) = item.as_name().ok().and_then(|n| std::str::from_utf8(n).ok()) {
                if matches!(name, "DCTDecode" | "JPXDecode" | "FlateDecode") {
                    return Some(name.to_string());
                }
            }
        }
        arr.first()
            .and_then(|first| first.as_name().ok())
            .and_then(|n| std::str::from_utf8(n).ok())
            .map(|s| s.to_string())
    }

    /// 获取颜色通道数
    fn get_color_channels(&self, dict: &Dictionary, doc: &Document) -> u32 {
        let cs_obj = match dict.get(b"ColorSpace") {
            Ok(obj) => obj,
            Err(_) => return 3,
        };
        let cs_obj = match doc.dereference(cs_obj) {
            Ok((_, resolved)) => resolved,
            Err(_) => return 3,
        };

        if let Ok(name_bytes) = cs_obj.as_name() {
            return Self::channels_from_name(std::str::from_utf8(name_bytes).unwrap_or(""));
        }

        if let Ok(arr) = cs_obj.as_array() {
            let first = arr.first().and_then(|f| f.as_name().ok()).and_then(|n| std::str::from_utf8(n).ok());
            match first {
                Some("ICCBased") => {
                    return arr
                        .get(1)
                        .and_then(|r| r.as_reference().ok())
                        .and_then(|id| doc.get_object(id).ok())
                        .and_then(|o| o.as_stream().ok())
                        .and_then(|s| int_of(&s.dict, b"N"))
                        .map(|n| n as u32)
                        .unwrap_or(3);
                }
                Some(name) => return Self::channels_from_name(name),
                None => {}
            }
        }

        3
    }

    fn channels_from_name(name: &str) -> u32 {
        match name {
            "DeviceGray" | "CalGray" | "G" => 1,
            "DeviceRGB" | "CalRGB" | "RGB" | "Lab" => 3,
            "DeviceCMYK" | "CMYK" => 4,
            _ => 3,
        }
    }
}

fn name_of(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .ok()
        .and_then(|s| s.as_name().ok())
        .and_then(|n| std::str::from_utf8(n).ok())
        .map(|s| s.to_string())
}

fn int_of(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).ok().and_then(|v| v.as_i64().ok())
}

/// 宽高必须是正的 u32
fn dimension(dict: &Dictionary, key: &[u8]) -> PackResult<u32> {
    let value = int_of(dict, key).unwrap_or(0);
    match u32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(PackError::Extraction(format!("图片尺寸无效: {}={}", String::from_utf8_lossy(key), value))),
    }
}

fn sample_len(width: u32, height: u32, channels: usize) -> PackResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| PackError::Extraction(format!("图片尺寸溢出: {}x{}x{}", width, height, channels)))
}

fn raw_content(stream: &Stream) -> PackResult<Vec<u8>> {
    if stream.content.is_empty() {
        return Err(PackError::Extraction("图片数据为空".to_string()));
    }
    Ok(stream.content.clone())
}

fn to_png(img: Option<image::DynamicImage>, width: u32, height: u32) -> PackResult<Vec<u8>> {
    let img = img.ok_or_else(|| PackError::Extraction(format!("无法创建图片 ({}x{})", width, height)))?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PackError::Extraction(format!("PNG编码失败: {}", e)))?;
    Ok(png)
}

/// 调色板图片：每像素一个 1/2/4/8 位索引，行按字节对齐
struct Palette {
    base_channels: usize,
    hival: usize,
    lookup: Vec<u8>,
}

impl Palette {
    fn decode(&self, data: &[u8], width: u32, height: u32, bits: i64) -> PackResult<Vec<u8>> {
        let bits = match bits {
            1 | 2 | 4 | 8 => bits as usize,
            other => return Err(PackError::Extraction(format!("Indexed 不支持的位深: {}", other))),
        };
        let row_bytes = (width as usize)
            .checked_mul(bits)
            .map(|b| (b + 7) / 8)
            .ok_or_else(|| PackError::Extraction("Indexed 行长度溢出".to_string()))?;
        let expected = sample_len(height, 1, row_bytes)?;
        if data.len() < expected {
            return Err(PackError::Extraction(format!("Indexed图片数据不足: {} < {}", data.len(), expected)));
        }

        let mut rgb = Vec::with_capacity(sample_len(width, height, 3)?);
        let mask = (1u16 << bits) - 1;
        for row in data[..expected].chunks_exact(row_bytes) {
            for x in 0..width as usize {
                let bit = x * bits;
                let shift = 8 - bits - bit % 8;
                let index = ((u16::from(row[bit / 8]) >> shift) & mask) as usize;
                let offset = index.min(self.hival) * self.base_channels;
                let entry = &self.lookup[offset..offset + self.base_channels];
                match self.base_channels {
                    1 => rgb.extend_from_slice(&[entry[0]; 3]),
                    4 => rgb.extend(cmyk_to_rgb(entry)),
                    _ => rgb.extend_from_slice(&entry[..3]),
                }
            }
        }
        Ok(rgb)
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u32;
            [px[0], px[1], px[2]].map(|c| ((255 - c as u32) * k / 255) as u8)
        })
        .collect()
}
